//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes, timeouts, addresses)
//! - Detect duplicate target names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PoolerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::PoolerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no targets configured")]
    NoTargets,
    #[error("duplicate target name '{0}'")]
    DuplicateTarget(String),
    #[error("target '{target}': {field} address '{value}' is not a host:port")]
    InvalidAddress {
        target: String,
        field: &'static str,
        value: String,
    },
    #[error("target '{0}': standby address equals primary address")]
    StandbyIsPrimary(String),
    #[error("target '{0}': max_size must be greater than zero")]
    ZeroMaxSize(String),
    #[error("target '{target}': min_size {min} exceeds max_size {max}")]
    MinExceedsMax { target: String, min: usize, max: usize },
    #[error("{0} must be greater than zero")]
    ZeroValue(String),
    #[error("listener bind address '{0}' is not a socket address")]
    InvalidBindAddress(String),
}

/// Check that an address looks like `host:port` with a numeric port.
fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &PoolerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroValue("listener.max_connections".into()));
    }
    if config.listener.max_frame_bytes == 0 {
        errors.push(ValidationError::ZeroValue("listener.max_frame_bytes".into()));
    }
    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::ZeroValue("health_check.interval_secs".into()));
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::ZeroValue("health_check.timeout_secs".into()));
        }
        if config.health_check.unhealthy_threshold == 0 {
            errors.push(ValidationError::ZeroValue(
                "health_check.unhealthy_threshold".into(),
            ));
        }
        if config.health_check.degraded_threshold == 0 {
            errors.push(ValidationError::ZeroValue(
                "health_check.degraded_threshold".into(),
            ));
        }
    }

    if config.targets.is_empty() {
        errors.push(ValidationError::NoTargets);
    }

    let mut seen = HashSet::new();
    for target in &config.targets {
        if !seen.insert(target.name.as_str()) {
            errors.push(ValidationError::DuplicateTarget(target.name.clone()));
        }
        if !is_host_port(&target.address) {
            errors.push(ValidationError::InvalidAddress {
                target: target.name.clone(),
                field: "primary",
                value: target.address.clone(),
            });
        }
        if let Some(standby) = &target.standby_address {
            if !is_host_port(standby) {
                errors.push(ValidationError::InvalidAddress {
                    target: target.name.clone(),
                    field: "standby",
                    value: standby.clone(),
                });
            } else if standby == &target.address {
                errors.push(ValidationError::StandbyIsPrimary(target.name.clone()));
            }
        }
        if target.max_size == 0 {
            errors.push(ValidationError::ZeroMaxSize(target.name.clone()));
        } else if target.min_size > target.max_size {
            errors.push(ValidationError::MinExceedsMax {
                target: target.name.clone(),
                min: target.min_size,
                max: target.max_size,
            });
        }
        if target.acquire_timeout_ms == 0 {
            errors.push(ValidationError::ZeroValue(format!(
                "targets.{}.acquire_timeout_ms",
                target.name
            )));
        }
        if target.connect_timeout_ms == 0 {
            errors.push(ValidationError::ZeroValue(format!(
                "targets.{}.connect_timeout_ms",
                target.name
            )));
        }
        if target.health_check_interval_secs == Some(0) {
            errors.push(ValidationError::ZeroValue(format!(
                "targets.{}.health_check_interval_secs",
                target.name
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TargetConfig;

    fn valid() -> PoolerConfig {
        let mut config = PoolerConfig::default();
        config.targets.push(TargetConfig::new("app", "127.0.0.1:5432"));
        config
    }

    #[test]
    fn default_with_target_is_valid() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn empty_targets_rejected() {
        let errors = validate_config(&PoolerConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::NoTargets));
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.targets.push(TargetConfig::new("app", "nonsense"));
        let mut bad = TargetConfig::new("reports", "db:5432");
        bad.min_size = 5;
        bad.max_size = 2;
        bad.standby_address = Some("db:5432".into());
        config.targets.push(bad);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateTarget("app".into())));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidAddress { field: "primary", .. })));
        assert!(errors.contains(&ValidationError::StandbyIsPrimary("reports".into())));
        assert!(errors.contains(&ValidationError::MinExceedsMax {
            target: "reports".into(),
            min: 5,
            max: 2
        }));
    }

    #[test]
    fn zero_max_size_rejected() {
        let mut config = valid();
        config.targets[0].max_size = 0;
        config.targets[0].min_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::ZeroMaxSize("app".into())]);
    }

    #[test]
    fn host_port_shapes() {
        assert!(is_host_port("db.internal:5432"));
        assert!(is_host_port("[::1]:5432"));
        assert!(!is_host_port("db.internal"));
        assert!(!is_host_port(":5432"));
        assert!(!is_host_port("db:99999"));
    }
}

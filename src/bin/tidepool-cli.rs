use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "tidepool-cli")]
#[command(about = "Management CLI for the tidepool connection pooler", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:6433")]
    url: String,

    #[arg(short, long, env = "TIDEPOOL_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check pooler status
    Status,
    /// List pools with idle, leased and waiting counts
    Pools,
    /// List client sessions and their bindings
    Sessions,
    /// Switch a pool to its standby address
    Failover {
        /// Pool (target database) name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Pools => client.get(format!("{}/admin/pools", cli.url)),
        Commands::Sessions => client.get(format!("{}/admin/sessions", cli.url)),
        Commands::Failover { name } => {
            client.post(format!("{}/admin/pools/{}/failover", cli.url, name))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

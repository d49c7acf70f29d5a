//! End-to-end pooling behavior over real TCP.

use std::time::Duration;

use futures_util::future::join_all;
use tidepool::protocol::{tag, Frame};

mod common;
use common::{target, TestBackend, TestClient, TestPooler};

#[tokio::test]
async fn many_clients_share_a_small_pool() {
    let backend = TestBackend::start().await;
    let pooler = TestPooler::start(vec![target("app", &backend, 2)]).await;

    let clients = (0..10).map(|i| {
        let pooler = &pooler;
        async move {
            let mut client = pooler.connect("app").await;
            for _ in 0..3 {
                let reply = client.query(&format!("SELECT {}", i)).await;
                assert_eq!(reply[0].tag, tag::DATA_ROW);
                assert!(reply.last().unwrap().is_ready());
            }
            client.close().await;
        }
    });
    join_all(clients).await;

    assert_eq!(backend.queries().len(), 30);
    assert!(backend.accepted() <= 2, "opened {} connections", backend.accepted());
}

#[tokio::test]
async fn transaction_stays_on_one_connection() {
    let backend = TestBackend::start().await;
    let pooler = TestPooler::start(vec![target("app", &backend, 2)]).await;

    let mut a = pooler.connect("app").await;
    let mut b = pooler.connect("app").await;

    a.query("BEGIN").await;
    a.query("INSERT a1").await;
    b.query("INSERT b1").await;
    a.query("INSERT a2").await;
    a.query("COMMIT").await;

    let a_conn = backend.connections_for("BEGIN");
    assert_eq!(a_conn.len(), 1);
    for query in ["INSERT a1", "INSERT a2", "COMMIT"] {
        assert_eq!(backend.connections_for(query), a_conn, "{query} moved connections");
    }
    assert_ne!(backend.connections_for("INSERT b1"), a_conn);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn error_inside_transaction_requires_rollback() {
    let backend = TestBackend::start().await;
    let pooler = TestPooler::start(vec![target("app", &backend, 1)]).await;
    let mut client = pooler.connect("app").await;

    client.query("BEGIN").await;
    let failed = client.query("FAIL now").await;
    assert_eq!(failed[0].tag, tag::ERROR);

    let rolled_back = client.query("ROLLBACK").await;
    assert!(rolled_back.last().unwrap().is_ready());

    // The connection went back clean and serves the next statement.
    let reply = client.query("SELECT 1").await;
    assert_eq!(reply[0].tag, tag::DATA_ROW);
    client.close().await;
}

#[tokio::test]
async fn disconnect_mid_transaction_rolls_back_and_frees_connection() {
    let backend = TestBackend::start().await;
    let pooler = TestPooler::start(vec![target("app", &backend, 1)]).await;

    let mut leaver = pooler.connect("app").await;
    leaver.query("BEGIN").await;
    leaver.query("INSERT partial").await;
    drop(leaver);

    assert!(backend.wait_for("ROLLBACK").await, "no rollback reached the backend");

    // With a single connection, this only succeeds once it was released.
    let mut next = pooler.connect("app").await;
    let reply = next.query("SELECT 1").await;
    assert_eq!(reply[0].tag, tag::DATA_ROW);
    assert_eq!(backend.accepted(), 1);
    next.close().await;
}

#[tokio::test]
async fn unknown_database_is_rejected() {
    let backend = TestBackend::start().await;
    let pooler = TestPooler::start(vec![target("app", &backend, 1)]).await;

    let mut client = TestClient::raw(pooler.addr).await;
    let reply = client.request(Frame::startup([("database", "nope")])).await;
    let (code, _) = reply[0].error_parts().unwrap();
    assert_eq!(code, "unknown_target");
    assert!(client.next_frame().await.is_none());
}

#[tokio::test]
async fn statement_pairing_rejects_begin() {
    let backend = TestBackend::start().await;
    let pooler = TestPooler::start(vec![target("app", &backend, 1)]).await;
    let mut client = pooler.connect("app").await;

    let ack = client.request(Frame::new(tag::PAIRING, "statement")).await;
    assert_eq!(ack[0], Frame::new(tag::COMMAND_COMPLETE, "SET"));

    let reply = client.query("BEGIN").await;
    assert_eq!(reply[0].error_parts().unwrap().0, "policy_violation");
    assert!(backend.queries().is_empty());
    client.close().await;
}

#[tokio::test]
async fn shutdown_closes_idle_sessions() {
    let backend = TestBackend::start().await;
    let pooler = TestPooler::start(vec![target("app", &backend, 1)]).await;
    let mut client = pooler.connect("app").await;
    client.query("SELECT 1").await;

    pooler.shutdown.trigger();

    let notice = tokio::time::timeout(Duration::from_secs(5), client.next_frame())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.error_parts().unwrap().0, "draining");

    pooler.task.await.unwrap().unwrap();
    let reports = pooler.coordinator.drain().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1.force_closed, 0);
}

//! Integration tests against a live Postgres
//!
//! Run with: cargo test --test integration -- --ignored --nocapture
//!
//! Connection settings come from POSTGRES_USER, POSTGRES_PASSWORD, POSTGRES_HOST and
//! POSTGRES_DB.

use connprobe::client::{ConnectionInfo, PgFactoryProvider};
use connprobe::connection::{Connection, SslMode};
use connprobe::probe::{
    FactoryProvider, Orchestrator, ProbeSettings, RunOutcome, SecurityOptions,
    DEFAULT_INSPECTION_QUERY,
};
use std::time::Duration;

fn test_url() -> String {
    format!(
        "postgres://{}:{}@{}/{}?connect_timeout=5",
        std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
        std::env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
        std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
        std::env::var("POSTGRES_DB").unwrap_or_else(|_| "postgres".to_string()),
    )
}

fn provider() -> PgFactoryProvider {
    let info = ConnectionInfo::parse(&test_url()).expect("parse url");
    let config = info.to_config().application_name("connprobe-test").build();
    PgFactoryProvider::new(info, config)
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_connect_and_inspect() {
    let info = ConnectionInfo::parse(&test_url()).expect("parse url");
    let config = info.to_config().sslmode(SslMode::Disable).build();

    let mut conn = Connection::connect(&info.endpoint, &config, None)
        .await
        .expect("connect");
    assert!(conn.server_version().is_some());

    let row = conn
        .query_row(DEFAULT_INSPECTION_QUERY)
        .await
        .expect("inspection query");
    assert!(row.get("currschema").expect("column").is_some());
    assert!(row.get("service_name").expect("column").is_some());

    conn.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_query_error_leaves_session_usable() {
    let info = ConnectionInfo::parse(&test_url()).expect("parse url");
    let config = info.to_config().sslmode(SslMode::Disable).build();

    let mut conn = Connection::connect(&info.endpoint, &config, None)
        .await
        .expect("connect");

    let err = conn
        .query_row("SELECT no_such_column FROM pg_class")
        .await
        .unwrap_err();
    assert_eq!(err.sqlstate(), Some("42703"));

    let row = conn.query_row("SELECT 1 AS one").await.expect("query");
    assert_eq!(row.get("one").unwrap(), Some("1"));
    conn.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_rejected_posture_runs_in_plaintext() {
    use connprobe::probe::{ConnectionFactory, ProbeConnection};

    let factory = provider()
        .factory(&SecurityOptions::for_posture(Some("REJECTED")))
        .expect("factory");
    let conn = factory.connect().await.expect("connect");
    assert!(conn.server_description().ends_with("tls=false"));
    conn.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_full_run() {
    let settings = ProbeSettings {
        iterations: 5,
        pause: Duration::from_millis(5),
        ..ProbeSettings::default()
    };
    let mut orchestrator = Orchestrator::new(provider(), settings, Vec::new());

    let reports = orchestrator.run_all().await.expect("run");
    assert_eq!(reports.len(), 3);

    // REJECTED always works against a server that accepts plaintext
    match &reports[2].outcome {
        Ok(RunOutcome::Completed(stats)) => assert_eq!(stats.count(), 5),
        other => panic!("expected completed plaintext variant, got {:?}", other),
    }

    let report = String::from_utf8(orchestrator.output().clone()).unwrap();
    assert!(report.contains("First Connection: "));
    assert!(report.contains("After 5 connects: "));
}

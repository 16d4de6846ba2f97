use std::sync::Arc;

use apm_datasource::history::MemoryHistoryStore;
use apm_datasource::job::ApmDataSource;
use apm_datasource::DataSourceError;
use claims::*;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::*;

#[tokio::test]
async fn test_persistent_login_failure_makes_five_attempts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/topo/node/detail/info"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryHistoryStore::new());
    let configuration = make_configuration(&server, &["101"], &["Time_Stamp"], &[("2024-01-01", "2024-01-02")]);
    let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store.clone());

    let error = assert_err!(source.execute_query().await);
    match error {
        DataSourceError::Authentication(auth) => assert_eq!(auth.attempts, 5),
        other => panic!("expected authentication error but got: {other:?}"),
    }
    assert!(store.queried().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_immediate_login_makes_single_request() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_node_detail(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_json(node_detail("scada@dev1", "grp-7", &[("Time_Stamp", "scada@tag1")])),
    )
    .await;

    let configuration = make_configuration(&server, &["101"], &["Time_Stamp"], &[("2024-01-01", "2024-01-02")]);
    let mut source =
        ApmDataSource::new(configuration, make_settings(5))?.with_store(Arc::new(MemoryHistoryStore::new()));

    let outcome = source.execute_query().await?;
    assert!(outcome.table.is_empty());
    assert_eq!(outcome.summary.empty_series, vec!["dev1\\tag1\\Time_Stamp".to_string()]);
    Ok(())
}

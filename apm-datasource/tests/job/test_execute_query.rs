use std::sync::Arc;

use apm_datasource::history::MemoryHistoryStore;
use apm_datasource::job::ApmDataSource;
use apm_datasource::model::{Sample, SampleValue};
use apm_datasource::phases::MachineStatus;
use apm_datasource::DataSourceError;
use claims::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::*;

#[tokio::test]
async fn test_single_device_time_stamp_series() -> anyhow::Result<()> {
    once_cell::sync::Lazy::force(&apm_datasource::logging::TEST_TRACING);
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_node_detail(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_json(node_detail("scada@dev1", "grp-7", &[("Time_Stamp", "scada@tag1")])),
    )
    .await;

    let store = Arc::new(MemoryHistoryStore::new().with_series(
        "grp-7",
        "dev1\\tag1",
        vec![Sample::new(*JAN_1_NOON, 2_i64), Sample::new(*JAN_1, 1_i64)],
    ));

    let configuration = make_configuration(&server, &["101"], &["Time_Stamp"], &[("2024-01-01", "2024-01-02")]);
    let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store.clone());
    let outcome = source.execute_query().await?;

    let table = outcome.table;
    assert_eq!(table.nr_rows(), 2);
    assert_eq!(table.column_names(), vec!["ts", "dev1\\tag1\\Time_Stamp"]);
    assert_eq!(table.timestamps(), &[*JAN_1, *JAN_1_NOON]);
    assert_eq!(assert_some!(table.value(0, "dev1\\tag1\\Time_Stamp")), &SampleValue::Integer(1));

    assert_eq!(outcome.summary.nr_predicates, 1);
    assert_eq!(outcome.summary.merged_series, vec!["dev1\\tag1\\Time_Stamp".to_string()]);
    assert_eq!(store.queried().len(), 1);

    let records = serde_json::to_value(&table)?;
    assert_eq!(
        records,
        json!([
            { "ts": "2024-01-01T00:00:00+00:00", "dev1\\tag1\\Time_Stamp": 1 },
            { "ts": "2024-01-01T12:00:00+00:00", "dev1\\tag1\\Time_Stamp": 2 },
        ])
    );
    Ok(())
}

#[tokio::test]
async fn test_columns_named_by_originating_parameter() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_node_detail(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_json(node_detail(
            "scada@dev1",
            "grp-7",
            &[("Time_Stamp", "scada@p1"), ("Spindle_Speed", "scada@p2")],
        )),
    )
    .await;
    mount_node_detail(
        &server,
        "102",
        ResponseTemplate::new(200).set_body_json(node_detail("scada@dev2", "grp-8", &[("Spindle_Speed", "scada@q2")])),
    )
    .await;

    let store = Arc::new(
        MemoryHistoryStore::new()
            .with_series("grp-7", "dev1\\p1", vec![Sample::new(*JAN_1, 1_i64), Sample::new(*JAN_1_NOON, 2_i64)])
            .with_series("grp-7", "dev1\\p2", vec![Sample::new(*JAN_1_NOON, 1200.5)])
            .with_series("grp-8", "dev2\\q2", vec![Sample::new(*JAN_1, 900.0)]),
    );

    let configuration = make_configuration(
        &server,
        &["101", "102"],
        &["Time_Stamp", "Spindle_Speed"],
        &[("2024-01-01", "2024-01-02")],
    );
    let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store);
    let outcome = source.execute_query().await?;

    let table = outcome.table;
    assert_eq!(
        table.column_names(),
        vec!["ts", "dev1\\p1\\Time_Stamp", "dev1\\p2\\Spindle_Speed", "dev2\\q2\\Spindle_Speed"]
    );
    assert_eq!(assert_some!(table.value(0, "dev1\\p2\\Spindle_Speed")), &SampleValue::Null);
    assert_eq!(assert_some!(table.value(1, "dev1\\p2\\Spindle_Speed")), &SampleValue::Float(1200.5));
    assert_eq!(assert_some!(table.value(0, "dev2\\q2\\Spindle_Speed")), &SampleValue::Float(900.0));
    assert_eq!(outcome.summary.nr_predicates, 3);
    Ok(())
}

#[tokio::test]
async fn test_failed_machines_are_skipped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_node_detail(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_json(node_detail("scada@dev1", "grp-7", &[("Time_Stamp", "scada@tag1")])),
    )
    .await;
    mount_node_detail(&server, "102", ResponseTemplate::new(503)).await;
    mount_node_detail(
        &server,
        "103",
        ResponseTemplate::new(200).set_body_json(node_detail("scada@dev3", "grp-9", &[("Temperature", "scada@t9")])),
    )
    .await;

    let store = Arc::new(MemoryHistoryStore::new().with_series(
        "grp-7",
        "dev1\\tag1",
        vec![Sample::new(*JAN_1, 1_i64)],
    ));

    let configuration = make_configuration(
        &server,
        &["101", "102", "103"],
        &["Time_Stamp"],
        &[("2024-01-01", "2024-01-02")],
    );
    let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store);
    let outcome = source.execute_query().await?;

    assert_eq!(outcome.summary.machines.len(), 3);
    assert_eq!(outcome.summary.nr_skipped_machines(), 2);
    assert_matches!(&outcome.summary.machines[0], MachineStatus::Resolved { .. });
    assert_matches!(&outcome.summary.machines[1], MachineStatus::Skipped { .. });
    assert_matches!(&outcome.summary.machines[2], MachineStatus::Skipped { .. });
    assert_eq!(outcome.table.nr_rows(), 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_series_are_reported() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_node_detail(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_json(node_detail(
            "scada@dev1",
            "grp-7",
            &[("Time_Stamp", "scada@tag1"), ("Load", "scada@tag4")],
        )),
    )
    .await;

    let store = Arc::new(MemoryHistoryStore::new().with_series(
        "grp-7",
        "dev1\\tag1",
        vec![Sample::new(*JAN_1, 1_i64)],
    ));

    let configuration = make_configuration(&server, &["101"], &["Time_Stamp", "Load"], &[("2024-01-01", "2024-01-02")]);
    let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store);
    let outcome = source.execute_query().await?;

    assert_eq!(outcome.summary.empty_series, vec!["dev1\\tag4\\Load".to_string()]);
    assert_eq!(outcome.table.column_names(), vec!["ts", "dev1\\tag1\\Time_Stamp"]);
    Ok(())
}

#[tokio::test]
async fn test_store_failure_fails_job() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_node_detail(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_json(node_detail("scada@dev1", "grp-7", &[("Time_Stamp", "scada@tag1")])),
    )
    .await;

    let store = Arc::new(MemoryHistoryStore::new().failing_on("dev1\\tag1"));
    let configuration = make_configuration(&server, &["101"], &["Time_Stamp"], &[("2024-01-01", "2024-01-02")]);
    let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store);

    let error = assert_err!(source.execute_query().await);
    assert_matches!(error, DataSourceError::History(_));
    Ok(())
}

#[tokio::test]
async fn test_invalid_query_makes_no_remote_calls() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryHistoryStore::new());
    let cases: Vec<(Vec<&str>, Vec<&str>, Vec<(&str, &str)>)> = vec![
        (vec![], vec!["Time_Stamp"], vec![("2024-01-01", "2024-01-02")]),
        (vec!["101"], vec![], vec![("2024-01-01", "2024-01-02")]),
        (vec!["101"], vec!["Time_Stamp"], vec![]),
        (vec!["101"], vec!["Time_Stamp"], vec![("01/01/2024", "2024-01-02")]),
        (vec!["101"], vec!["Speed"], vec![("2024-01-01", "2024-01-02")]),
    ];

    for (machine_ids, parameters, ranges) in cases {
        let configuration = make_configuration(&server, &machine_ids, &parameters, &ranges);
        let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store.clone());
        assert_matches!(source.execute_query().await, Err(DataSourceError::Validation(_)));
    }

    assert!(store.queried().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_shared_compact_paths_keep_one_column_per_group() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_node_detail(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_json(node_detail(
            "plant-a@dev1",
            "grp-7",
            &[("Time_Stamp", "scada@tag1"), ("Speed", "scada@tag2")],
        )),
    )
    .await;
    mount_node_detail(
        &server,
        "102",
        ResponseTemplate::new(200).set_body_json(node_detail("plant-b@dev1", "grp-8", &[("Speed", "scada@tag2")])),
    )
    .await;

    let store = Arc::new(
        MemoryHistoryStore::new()
            .with_series("grp-7", "dev1\\tag1", vec![Sample::new(*JAN_1, 1_i64)])
            .with_series("grp-7", "dev1\\tag2", vec![Sample::new(*JAN_1, 10_i64)])
            .with_series("grp-8", "dev1\\tag2", vec![Sample::new(*JAN_1, 20_i64)]),
    );

    let configuration =
        make_configuration(&server, &["101", "102"], &["Time_Stamp", "Speed"], &[("2024-01-01", "2024-01-02")]);
    let mut source = ApmDataSource::new(configuration, make_settings(5))?.with_store(store);
    let table = source.execute_query().await?.table;

    assert_eq!(
        table.column_names(),
        vec!["ts", "dev1\\tag1\\Time_Stamp", "grp-7\\dev1\\tag2\\Speed", "grp-8\\dev1\\tag2\\Speed"]
    );
    assert_eq!(assert_some!(table.value(0, "grp-7\\dev1\\tag2\\Speed")), &SampleValue::Integer(10));
    assert_eq!(assert_some!(table.value(0, "grp-8\\dev1\\tag2\\Speed")), &SampleValue::Integer(20));

    let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_value(serde_json::to_value(&table)?)?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].len(), table.column_names().len());
    Ok(())
}

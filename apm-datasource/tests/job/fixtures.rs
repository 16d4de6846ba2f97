use apm_datasource::configuration::{Credentials, JobConfiguration, TimeRangeSpec};
use apm_datasource::model::MachineId;
use apm_datasource::settings::Settings;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub static JAN_1: Lazy<DateTime<Utc>> = Lazy::new(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
pub static JAN_1_NOON: Lazy<DateTime<Utc>> = Lazy::new(|| Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());

pub const ACCESS_TOKEN: &str = "token-1";

pub fn make_configuration(
    server: &MockServer, machine_ids: &[&str], parameters: &[&str], ranges: &[(&str, &str)],
) -> JobConfiguration {
    JobConfiguration::new(
        Credentials::new("operator@example.com", "s3cr3t"),
        Url::parse(&format!("{}/", server.uri())).unwrap(),
        machine_ids.iter().map(|id| MachineId::new(*id)).collect(),
        parameters.iter().map(|p| p.to_string()).collect(),
        "mongodb://127.0.0.1:9/history",
        ranges.iter().map(|(s, e)| TimeRangeSpec::new(*s, *e)).collect(),
    )
}

pub fn make_settings(max_login_attempts: u32) -> Settings {
    let mut settings = Settings::default();
    settings.apm.max_login_attempts = max_login_attempts;
    settings
}

pub fn node_detail(device_id: &str, group_id: &str, features: &[(&str, &str)]) -> Value {
    let monitor: Vec<_> = features
        .iter()
        .map(|(name, tag)| json!({ "name": name, "tag": tag }))
        .collect();

    json!({
        "id": 0,
        "dtInstance": {
            "feature": { "monitor": monitor },
            "property": { "iotSense": { "deviceId": device_id, "groupId": group_id } }
        }
    })
}

pub async fn mount_login(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": ACCESS_TOKEN })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub async fn mount_node_detail(server: &MockServer, machine_id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/topo/node/detail/info"))
        .and(query_param("id", machine_id))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

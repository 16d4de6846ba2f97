use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Database};
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use super::{HistoryError, HistoryStore};
use crate::model::{QueryPredicate, Sample, SampleValue, TimeRange};
use crate::settings::HistorySettings;

const GROUP_FIELD: &str = "s";
const TAG_FIELD: &str = "t";
const TIMESTAMP_FIELD: &str = "ts";
const VALUE_FIELD: &str = "v";

/// History store backed by the MongoDB database named in the job's connection string.
#[derive(Debug, Clone)]
pub struct MongoHistoryStore {
    database: Database,
}

impl MongoHistoryStore {
    #[tracing::instrument(level = "info", skip(uri))]
    pub async fn connect(uri: &SecretString, settings: &HistorySettings) -> Result<Self, HistoryError> {
        let mut options = ClientOptions::parse(uri.expose_secret().as_str()).await?;
        if settings.app_name.is_some() {
            options.app_name = settings.app_name.clone();
        }
        if settings.connect_timeout.is_some() {
            options.connect_timeout = settings.connect_timeout;
        }
        if settings.server_selection_timeout.is_some() {
            options.server_selection_timeout = settings.server_selection_timeout;
        }

        let client = Client::with_options(options)?;
        let database = client.default_database().ok_or(HistoryError::MissingDatabase)?;
        tracing::info!(database=%database.name(), "connected to history store");
        Ok(Self { database })
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }
}

#[async_trait]
impl HistoryStore for MongoHistoryStore {
    async fn find(&self, collection: &str, predicate: &QueryPredicate) -> Result<Vec<Sample>, HistoryError> {
        let _timer = super::start_history_timer(collection);
        let span = tracing::info_span!(
            "query history store",
            %collection, group_id=%predicate.group_id, compact_path=%predicate.compact_path
        );

        let result = self.do_find(collection, predicate).instrument(span).await;
        if let Err(ref error) = result {
            tracing::error!(?error, compact_path=%predicate.compact_path, "history store query failed");
            super::track_history_errors(super::FIND, error);
        }
        result
    }
}

impl MongoHistoryStore {
    async fn do_find(&self, collection: &str, predicate: &QueryPredicate) -> Result<Vec<Sample>, HistoryError> {
        let options = FindOptions::builder()
            .projection(doc! { "_id": 0, GROUP_FIELD: 0, TAG_FIELD: 0 })
            .sort(doc! { TIMESTAMP_FIELD: 1 })
            .build();

        let mut cursor = self
            .database
            .collection::<Document>(collection)
            .find(predicate_filter(predicate), options)
            .await?;

        let mut samples = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            samples.push(sample_from_document(&document)?);
        }

        tracing::debug!(nr_samples=%samples.len(), "history store query completed");
        Ok(samples)
    }
}

pub(crate) fn predicate_filter(predicate: &QueryPredicate) -> Document {
    let time_clauses: Vec<Bson> = predicate.time_ranges.iter().map(time_clause).collect();

    doc! {
        GROUP_FIELD: predicate.group_id.as_ref(),
        TAG_FIELD: predicate.compact_path.as_ref(),
        "$or": time_clauses,
    }
}

fn time_clause(range: &TimeRange) -> Bson {
    let start = mongodb::bson::DateTime::from_millis(range.start.timestamp_millis());
    let end = mongodb::bson::DateTime::from_millis(range.end.timestamp_millis());
    Bson::Document(doc! { TIMESTAMP_FIELD: { "$gte": start, "$lte": end } })
}

/// Reads a projected history document: its `ts` plus the remaining reading field, `v` when present.
pub(crate) fn sample_from_document(document: &Document) -> Result<Sample, HistoryError> {
    let ts = match document.get(TIMESTAMP_FIELD) {
        Some(Bson::DateTime(ts)) => Utc
            .timestamp_millis_opt(ts.timestamp_millis())
            .single()
            .ok_or_else(|| HistoryError::MalformedDocument(format!("ts out of range: {ts}")))?,
        Some(other) => {
            return Err(HistoryError::MalformedDocument(format!("ts is not a date: {other}")));
        },
        None => return Err(HistoryError::MalformedDocument("document has no ts".to_string())),
    };

    let reading = document
        .get(VALUE_FIELD)
        .or_else(|| document.iter().find(|(k, _)| k.as_str() != TIMESTAMP_FIELD).map(|(_, v)| v))
        .ok_or_else(|| HistoryError::MalformedDocument(format!("document at {ts} has no reading")))?;

    Ok(Sample { ts, value: sample_value(reading) })
}

fn sample_value(reading: &Bson) -> SampleValue {
    match reading {
        Bson::Boolean(value) => SampleValue::Boolean(*value),
        Bson::Int32(value) => SampleValue::Integer(i64::from(*value)),
        Bson::Int64(value) => SampleValue::Integer(*value),
        Bson::Double(value) => SampleValue::Float(*value),
        Bson::String(value) => SampleValue::Text(value.clone()),
        Bson::Null | Bson::Undefined => SampleValue::Null,
        Bson::DateTime(value) => Utc
            .timestamp_millis_opt(value.timestamp_millis())
            .single()
            .map_or(SampleValue::Null, |ts| SampleValue::Text(ts.to_rfc3339())),
        other => SampleValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use claims::*;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::CompactPath;

    #[test]
    fn test_predicate_filter() {
        let predicate = QueryPredicate {
            group_id: "grp-7".into(),
            compact_path: CompactPath::new("dev1", "tag1"),
            parameter: "Time_Stamp".to_string(),
            time_ranges: vec![
                assert_ok!(TimeRange::parse("2024-01-01", "2024-01-02")),
                assert_ok!(TimeRange::parse("2024-02-01", "2024-02-01")),
            ],
        };

        let jan_1 = mongodb::bson::DateTime::from_millis(1_704_067_200_000);
        let jan_2 = mongodb::bson::DateTime::from_millis(1_704_153_600_000);
        let feb_1 = mongodb::bson::DateTime::from_millis(1_706_745_600_000);

        assert_eq!(
            predicate_filter(&predicate),
            doc! {
                "s": "grp-7",
                "t": "dev1\\tag1",
                "$or": [
                    { "ts": { "$gte": jan_1, "$lte": jan_2 } },
                    { "ts": { "$gte": feb_1, "$lte": feb_1 } },
                ],
            }
        );
    }

    #[test]
    fn test_sample_from_document() {
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ts = mongodb::bson::DateTime::from_millis(noon.timestamp_millis());

        let actual = assert_ok!(sample_from_document(&doc! { "ts": ts, "v": 17.5 }));
        assert_eq!(actual, Sample::new(noon, 17.5));

        let actual = assert_ok!(sample_from_document(&doc! { "ts": ts, "reading": 3_i32 }));
        assert_eq!(actual, Sample::new(noon, 3_i64));

        let actual = assert_ok!(sample_from_document(&doc! { "ts": ts, "v": Bson::Null }));
        assert_eq!(actual.value, SampleValue::Null);

        let actual = assert_ok!(sample_from_document(&doc! { "ts": ts, "v": "RUN" }));
        assert_eq!(actual.value, SampleValue::Text("RUN".to_string()));
    }

    #[test]
    fn test_sample_from_malformed_document() {
        assert_matches!(
            sample_from_document(&doc! { "v": 1 }),
            Err(HistoryError::MalformedDocument(_))
        );
        assert_matches!(
            sample_from_document(&doc! { "ts": "2024-01-01", "v": 1 }),
            Err(HistoryError::MalformedDocument(_))
        );
        let ts = mongodb::bson::DateTime::from_millis(0);
        assert_matches!(
            sample_from_document(&doc! { "ts": ts }),
            Err(HistoryError::MalformedDocument(_))
        );
    }
}

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};
use serde::Serialize;
use thiserror::Error;

use crate::apm::{ApmContext, ApmError, AuthenticationError, NodeDetail};
use crate::configuration::Credentials;
use crate::error::MetricLabel;
use crate::model::{self, DeviceRecord, GroupId, MachineId, TagRef};

/// Why a machine contributed no device record. Never fatal to the job.
#[derive(Debug, Error)]
pub enum MachineFetchError {
    #[error("{0}")]
    Apm(#[from] ApmError),

    #[error("no monitored feature matches parameters {parameters:?}")]
    NoMatchingFeatures { parameters: Vec<String> },
}

impl MachineFetchError {
    fn reason_label(&self) -> &'static str {
        match self {
            Self::Apm(_) => "fetch",
            Self::NoMatchingFeatures { .. } => "no_matching_features",
        }
    }
}

#[derive(Debug)]
pub enum MachineResolution {
    Resolved(DeviceRecord),
    Skipped { machine_id: MachineId, reason: MachineFetchError },
}

impl MachineResolution {
    pub const fn machine_id(&self) -> &MachineId {
        match self {
            Self::Resolved(record) => &record.machine_id,
            Self::Skipped { machine_id, .. } => machine_id,
        }
    }

    pub const fn device(&self) -> Option<&DeviceRecord> {
        match self {
            Self::Resolved(record) => Some(record),
            Self::Skipped { .. } => None,
        }
    }
}

/// Serializable outcome of resolving one machine, as reported in the job summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MachineStatus {
    Resolved { machine_id: MachineId, compact_paths: Vec<String> },
    Skipped { machine_id: MachineId, reason: String },
}

impl From<&MachineResolution> for MachineStatus {
    fn from(resolution: &MachineResolution) -> Self {
        match resolution {
            MachineResolution::Resolved(record) => Self::Resolved {
                machine_id: record.machine_id.clone(),
                compact_paths: record.compact_paths.iter().map(|p| p.to_string()).collect(),
            },
            MachineResolution::Skipped { machine_id, reason } => {
                Self::Skipped { machine_id: machine_id.clone(), reason: reason.to_string() }
            },
        }
    }
}

pub static MACHINES_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("machines_skipped", "Number of machines skipped during topology resolution"),
        &["reason"],
    )
    .expect("failed creating machines_skipped metric")
});

/// Authenticates once then resolves each machine in order. Only authentication failure is fatal;
/// every per-machine failure becomes a `Skipped` resolution.
#[tracing::instrument(level = "info", skip(apm, credentials, parameters))]
pub async fn resolve_devices(
    apm: &ApmContext, credentials: &Credentials, machine_ids: &[MachineId], parameters: &[String],
) -> Result<Vec<MachineResolution>, AuthenticationError> {
    let token = apm.authenticate(credentials).await?;

    let mut resolutions = Vec::with_capacity(machine_ids.len());
    for machine_id in machine_ids {
        let resolution = match apm.query_node_detail(&token, machine_id).await {
            Ok(detail) => match device_record_from(machine_id, &detail, parameters) {
                Ok(record) => MachineResolution::Resolved(record),
                Err(reason) => MachineResolution::Skipped { machine_id: machine_id.clone(), reason },
            },
            Err(error) => MachineResolution::Skipped { machine_id: machine_id.clone(), reason: error.into() },
        };

        match &resolution {
            MachineResolution::Resolved(record) => {
                tracing::info!(%machine_id, compact_paths=?record.compact_paths, "resolved machine topology");
            },
            MachineResolution::Skipped { reason, .. } => {
                MACHINES_SKIPPED.with_label_values(&[reason.reason_label()]).inc();
                if let MachineFetchError::Apm(error) = reason {
                    tracing::warn!(%machine_id, error=%error, label=%error.label(), "skipping machine - detail fetch failed");
                } else {
                    tracing::warn!(%machine_id, %reason, "skipping machine");
                }
            },
        }

        resolutions.push(resolution);
    }

    Ok(resolutions)
}

/// Flattens node detail into a device record holding the monitored features named in `parameters`,
/// in feature order.
pub fn device_record_from(
    machine_id: &MachineId, detail: &NodeDetail, parameters: &[String],
) -> Result<DeviceRecord, MachineFetchError> {
    let iot_sense = &detail.dt_instance.property.iot_sense;
    let device_id = model::last_segment(iot_sense.device_id.as_str());

    let tags: Vec<TagRef> = detail
        .dt_instance
        .feature
        .monitor
        .iter()
        .filter(|feature| parameters.iter().any(|p| p == &feature.name))
        .map(|feature| TagRef::new(feature.name.as_str(), model::last_segment(feature.tag.as_str())))
        .collect();

    if tags.is_empty() {
        return Err(MachineFetchError::NoMatchingFeatures { parameters: parameters.to_vec() });
    }

    Ok(DeviceRecord::new(
        machine_id.clone(),
        device_id,
        GroupId::new(iot_sense.group_id.as_str()),
        tags,
    ))
}

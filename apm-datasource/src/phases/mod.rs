//! Stages of one data retrieval job, in execution order: topology resolution, query planning,
//! query execution and series merge.

mod execute;
mod merge;
mod plan;
mod topology;

pub use execute::{execute, series_names, Execution};
pub use merge::merge;
pub use plan::{plan_queries, plan_with_ranges};
pub use topology::{
    device_record_from, resolve_devices, MachineFetchError, MachineResolution, MachineStatus, MACHINES_SKIPPED,
};

//! Rank-tagged, timestamped diagnostics layered over the `log` facade.
//!
//! `status` prints from any rank, `report` prints only from rank 0,
//! `report_barrier` synchronizes every rank first.

use chrono::Local;
use clap_verbosity_flag::Verbosity;
use mpi::topology::SystemCommunicator;
use mpi::traits::*;

pub fn init(verbosity: &Verbosity) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(verbosity.log_level_filter());
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

/// Emits a single rank-tagged line: `<timestamp> process <rank>: <message>`.
pub fn status(world: &SystemCommunicator, message: &str) {
    let rank = world.rank();
    log::info!("{} process {}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), rank, message);
}

/// Emits a message only from rank 0.
pub fn report(world: &SystemCommunicator, message: &str) {
    if world.rank() == 0 {
        status(world, message);
    }
}

/// Barrier-synchronizes every rank, then reports from rank 0.
pub fn report_barrier(world: &SystemCommunicator, message: &str) {
    world.barrier();
    report(world, message);
}

/// Warns with a rank/file tag, for the short-file anomaly path.
pub fn warn_anomaly(world: &SystemCommunicator, file: &std::path::Path, got: usize, expected: usize) {
    log::warn!(
        "{} process {}: file {} has only {} timestep(s) for the target variable (expected {}); repeating the first timestep to fill remaining columns",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        world.rank(),
        file.display(),
        got,
        expected
    );
}

//! `ProcessInfo`: the per-rank record threaded through every component
//! instead of relying on process-global state.

use std::path::PathBuf;

use mpi::topology::SystemCommunicator;
use mpi::traits::*;

use crate::config::ConvertArgs;
use crate::error::ConvertError;

/// One input file as seen by the rank that owns it.
pub struct InputFile {
    pub path: PathBuf,
    pub handle: netcdf::File,
    /// Time-dimension length declared by this file's variable shape at
    /// discovery time. Used only to seed the collective max that produces
    /// `ProcessInfo::expected_time_slices`.
    pub num_time_slices: usize,
}

/// Global state for one rank across the whole conversion run.
pub struct ProcessInfo {
    pub args: ConvertArgs,
    pub rank: i32,
    pub size: i32,

    pub files: Vec<InputFile>,
    /// Number of time slices every file is expected to contribute, the
    /// maximum `num_time_slices` across every file on every rank. A file
    /// that declares fewer slices than this is a short-file anomaly.
    pub expected_time_slices: usize,
    /// `files.len() * expected_time_slices`, this rank's column count.
    pub num_local_cols: usize,
    /// Column count contributed by every rank, indexed by rank.
    pub cols_per_process: Vec<i32>,
    /// Exclusive prefix sum of `cols_per_process`: rank r's columns start
    /// at `output_col_offsets[r]` in the global column ordering.
    pub output_col_offsets: Vec<i32>,
    pub num_cols: i64,

    /// Timestamp of every column contributed by this rank, in local file
    /// order (seconds since epoch).
    pub time_stamps: Vec<i64>,

    /// Flat (H*W) indices of masked ("missing") cells on the reference
    /// mask.
    pub missing_locations: Vec<i32>,
    /// Flat indices of observed cells on the reference mask (complement of
    /// `missing_locations`).
    pub observed_locations: Vec<i32>,
}

impl ProcessInfo {
    pub fn new(args: ConvertArgs, world: &SystemCommunicator) -> Self {
        ProcessInfo {
            args,
            rank: world.rank(),
            size: world.size(),
            files: Vec::new(),
            expected_time_slices: 0,
            num_local_cols: 0,
            cols_per_process: Vec::new(),
            output_col_offsets: Vec::new(),
            num_cols: 0,
            time_stamps: Vec::new(),
            missing_locations: Vec::new(),
            observed_locations: Vec::new(),
        }
    }

    pub fn num_rows_per_level(&self) -> usize {
        self.observed_locations.len()
    }
}

/// Broadcasts an `i64` from rank 0 to every rank. Rank 0 passes the real
/// value; every other rank's `value` is overwritten with rank 0's.
pub fn broadcast_i64(world: &SystemCommunicator, mut value: i64) -> i64 {
    world.process_at_rank(0).broadcast_into(&mut value);
    value
}

/// Aborts the whole communicator after logging a fatal diagnostic. Any
/// rank's fatal condition must abort every rank, since a partial write
/// would leave the output file in an inconsistent state.
pub fn abort_on_fatal(world: &SystemCommunicator, err: &ConvertError) -> ! {
    log::error!("process {}: fatal: {}", world.rank(), err);
    world.abort(1);
}

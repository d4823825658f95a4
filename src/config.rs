use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use clap_verbosity_flag::Verbosity;

/// Command-line interface for the ocean grid-to-matrix converter.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Converts a directory of gridded ocean-climate files into one dense row/column matrix.",
    long_about = "Partitions a directory of per-time-window NetCDF files across MPI ranks, \
elides cells masked as missing on a reference mask, and writes a single dense \
(numRows x numCols) matrix to a parallel HDF5 file, alongside a metadata \
sidecar describing the row-to-geography and column-to-timestamp mapping."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the distributed conversion.
    Convert(ConvertArgs),
}

/// Arguments for the `convert` subcommand.
#[derive(ClapArgs, Debug, Clone)]
pub struct ConvertArgs {
    /// Directory containing the input `.nc` files.
    #[arg(long, env = "OCEANMAT_INPUT_DIR")]
    pub input_dir: PathBuf,

    /// Path of the output dense matrix file (HDF5, dataset `rows`).
    #[arg(long, env = "OCEANMAT_OUTPUT_MATRIX")]
    pub output_matrix: PathBuf,

    /// Path of the output metadata sidecar archive.
    #[arg(long, env = "OCEANMAT_METADATA_OUT")]
    pub metadata_out: PathBuf,

    /// Name of the variable to convert.
    #[arg(long, env = "OCEANMAT_VARIABLE")]
    pub variable: String,

    /// Name of the per-time-slice timestamp variable.
    #[arg(long, env = "OCEANMAT_TIME_VARIABLE", default_value = "time")]
    pub time_variable: String,

    /// Verify that the missing-cell mask is identical across every file,
    /// time slice, level, and rank before writing.
    /// Off by default since verification is O(total cells).
    #[arg(long, default_value_t = false)]
    pub verify_mask: bool,

    /// Also populate the extended metadata fields (observed lat/lon/level
    /// coordinates and flat locations per row) via the coordinate join.
    #[arg(long, default_value_t = false)]
    pub extended_metadata: bool,

    /// Number of writer ranks (one row-chunk owner per level pass).
    /// A good default is one writer per physical node.
    #[arg(long, env = "OCEANMAT_NUM_WRITERS")]
    pub num_writers: usize,

    /// Number of physical nodes in the job.
    #[arg(long, env = "OCEANMAT_NUM_NODES")]
    pub num_nodes: usize,

    /// Number of MPI processes per physical node.
    #[arg(long, env = "OCEANMAT_PROCS_PER_NODE", default_value_t = 1)]
    pub procs_per_node: usize,

    /// Filesystem stripe size in bytes, used to align the output dataset
    /// and choose the aggregator-process count. Unset disables alignment
    /// tuning.
    #[arg(long, env = "OCEANMAT_STRIPE_SIZE")]
    pub stripe_size: Option<u64>,
}

impl ConvertArgs {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.variable.trim().is_empty() {
            return Err(crate::error::ConvertError::Config(
                "--variable must not be empty".into(),
            ));
        }
        if self.num_writers == 0 {
            return Err(crate::error::ConvertError::Config(
                "--num-writers must be at least 1".into(),
            ));
        }
        if self.num_nodes == 0 {
            return Err(crate::error::ConvertError::Config(
                "--num-nodes must be at least 1".into(),
            ));
        }
        if !self.input_dir.exists() {
            return Err(crate::error::ConvertError::Config(format!(
                "input directory does not exist: {}",
                self.input_dir.display()
            )));
        }
        Ok(())
    }
}

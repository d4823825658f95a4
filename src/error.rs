use std::path::PathBuf;

/// Error taxonomy for the conversion pipeline.
///
/// `MaskMismatch` and the I/O/library wrapper variants are fatal: any rank
/// observing one aborts the whole communicator (see `process_info::abort`).
/// Short-file anomalies are *not* represented here; they are logged
/// warnings, not errors (see `level_loader::apply_anomaly_policy`).
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no input files with extension '.nc' found under {0}")]
    NoInputFiles(PathBuf),

    #[error("failed to open input file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("netcdf operation failed on {path}: {source}")]
    Netcdf {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("missing variable '{0}' in {1}")]
    MissingVariable(String, PathBuf),

    #[error("hdf5 operation failed: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("mpi operation failed: {0}")]
    Mpi(String),

    #[error("the missing-cell mask on rank {rank} does not match the reference mask (first divergent file: {file})")]
    MaskMismatch { rank: i32, file: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize metadata archive: {0}")]
    Metadata(#[from] Box<bincode::ErrorKind>),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

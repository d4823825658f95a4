//! Output Dataset Creator.
//!
//! Collectively creates the output matrix file with MPI-aware file-access
//! properties and a single `rows` dataset of shape (numRows, numCols),
//! float32, fill-time "never" to avoid allocation-time zeroing cost.

use mpi::raw::AsRaw;
use mpi::topology::SystemCommunicator;

use crate::error::Result;

/// Collectively creates `path` and its `rows` dataset. Every rank must call
/// this (HDF5's MPI-IO file access property list requires a collective
/// open across the whole communicator).
pub fn create_output_dataset(
    world: &SystemCommunicator,
    path: &std::path::Path,
    num_rows: usize,
    num_cols: usize,
    stripe_size: Option<u64>,
) -> Result<hdf5::File> {
    let mut access = hdf5::FileAccessBuilder::new();
    access.mpio(world.as_raw(), None);
    if let Some(stripe) = stripe_size {
        // Align large contiguous writes to the filesystem's stripe size.
        access.alignment(stripe, stripe);
    }

    let file = hdf5::FileBuilder::new()
        .with_access_plist(access)
        .create(path)?;

    file.new_dataset::<f32>()
        .shape((num_rows, num_cols))
        .no_fill()
        .create("rows")?;

    Ok(file)
}

/// Opens an already-created output file for collective writing (used by
/// writer ranks after `create_output_dataset` has run on every rank).
pub fn open_rows_dataset(file: &hdf5::File) -> Result<hdf5::Dataset> {
    Ok(file.dataset("rows")?)
}

//! Parallel Writer.
//!
//! Takes a collected row-chunk tile and writes it into the output `rows`
//! dataset at the correct absolute row range. Non-writer ranks for a given
//! chunk issue no write but must still reach the same collective barriers.

use ndarray::Array2;

use crate::error::Result;
use crate::redistribute::CollectedChunk;

/// Writes one reshaped chunk into `dataset` at
/// `[level_start_row + chunk.output_row_offset, +chunk_rows) x [0, numCols)`.
pub fn write_chunk(
    dataset: &hdf5::Dataset,
    chunk: &CollectedChunk,
    tile: &Array2<f32>,
    level_start_row: usize,
) -> Result<()> {
    let row_start = level_start_row + chunk.output_row_offset;
    let row_end = row_start + chunk.chunk_rows;
    dataset.write_slice(tile, (row_start..row_end, ..))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_chunk_targets_absolute_row_range() {
        // Pure range arithmetic; actual dataset I/O is exercised only with a
        // real HDF5 file, which these unit tests do not open.
        let chunk = CollectedChunk { data: vec![], chunk_rows: 4, output_row_offset: 10 };
        let level_start_row = 100usize;
        let row_start = level_start_row + chunk.output_row_offset;
        let row_end = row_start + chunk.chunk_rows;
        assert_eq!((row_start, row_end), (110, 114));
    }
}

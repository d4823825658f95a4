//! Gather-to-Writer Redistributor.
//!
//! Splits the observed-cells axis into W contiguous row chunks and, for
//! each chunk, performs a collective variable-count gather that concatenates
//! every rank's (chunkRows x localCols) fragment into the writer's
//! (chunkRows x numCols) buffer, laid out in rank order of columns.

use mpi::datatype::PartitionMut;
use mpi::topology::SystemCommunicator;
use mpi::traits::*;
use ndarray::{Array2, ArrayView2};

use crate::process_info::ProcessInfo;

/// Breaks `0..length` into `num` roughly equal contiguous pieces, larger
/// chunks first (ties favor earlier chunks getting the remainder row).
pub fn chunk_it(length: usize, num: usize) -> Vec<(usize, usize)> {
    if num == 0 {
        return Vec::new();
    }
    let avg = length as f64 / num as f64;
    let mut starts = Vec::with_capacity(num);
    let mut ends = Vec::with_capacity(num);
    let mut last = 0.0f64;
    while last < length as f64 && starts.len() < num {
        starts.push(last as usize);
        ends.push((last + avg) as usize);
        last += avg;
    }
    // Float accumulation can undershoot the final boundary by one element
    // through rounding; pin the last chunk's end to `length`.
    if let Some(last_end) = ends.last_mut() {
        *last_end = length;
    }
    starts.into_iter().zip(ends).collect()
}

/// Maps a chunk index (0..W) to the rank that should write it, placing
/// successive chunks on distinct nodes to balance write bandwidth.
pub fn chunk_idx_to_writer(chunk_idx: usize, num_nodes: usize, procs_per_node: usize) -> i32 {
    let machine_number = chunk_idx % num_nodes;
    let offset_on_machine = chunk_idx / num_nodes;
    (machine_number * procs_per_node + offset_on_machine) as i32
}

/// One row-chunk of one level, collected at its writer rank.
pub struct CollectedChunk {
    /// `chunk_rows * info.num_cols` values, laid out as the concatenation of
    /// rank 0's `(chunk_rows x local_cols)` fragment, then rank 1's, etc.
    pub data: Vec<f32>,
    pub chunk_rows: usize,
    /// Row offset of this chunk within the level (exclusive prefix sum of
    /// chunk sizes), not yet adjusted by `levelStartRow`.
    pub output_row_offset: usize,
}

/// Runs one full level pass of W gathers. On non-writer ranks, returns an
/// empty vector. On each writer rank, returns exactly the chunks it owns
/// for this level.
pub fn gather_to_writers(
    world: &SystemCommunicator,
    info: &ProcessInfo,
    cur_lev_data: &ArrayView2<f32>,
) -> Vec<CollectedChunk> {
    let num_observed = cur_lev_data.nrows();
    let num_writers = info.args.num_writers;
    let chunks = chunk_it(num_observed, num_writers);
    let chunk_sizes: Vec<usize> = chunks.iter().map(|(s, e)| e - s).collect();
    let output_row_offsets = crate::discovery::exclusive_prefix_sum(
        &chunk_sizes.iter().map(|&c| c as i32).collect::<Vec<_>>(),
    );

    let mut collected = Vec::new();
    for (chunk_idx, &(start, end)) in chunks.iter().enumerate() {
        let writer_rank = chunk_idx_to_writer(chunk_idx, info.args.num_nodes, info.args.procs_per_node);
        let chunk_rows = end - start;

        let fragment: Vec<f32> = cur_lev_data.slice(ndarray::s![start..end, ..]).iter().copied().collect();

        let writer = world.process_at_rank(writer_rank);
        if info.rank == writer_rank {
            let counts: Vec<i32> = info.cols_per_process.iter().map(|&c| c * chunk_rows as i32).collect();
            let displs = crate::discovery::exclusive_prefix_sum(&counts);
            let mut buf = vec![0f32; (chunk_rows * info.num_cols as usize) as usize];
            let mut partition = PartitionMut::new(&mut buf, counts, displs);
            writer.gather_varcount_into_root(&fragment[..], &mut partition);
            collected.push(CollectedChunk {
                data: buf,
                chunk_rows,
                output_row_offset: output_row_offsets[chunk_idx] as usize,
            });
        } else {
            writer.gather_varcount_into(&fragment[..]);
        }
    }
    collected
}

/// Reshapes a collected chunk's flat rank-ordered buffer back into a dense
/// `(chunk_rows x numCols)` tile. Iterates processes in rank order, copying
/// each one's contiguous fragment into its output column range.
pub fn reshape_collected_chunk(chunk: &CollectedChunk, info: &ProcessInfo) -> Array2<f32> {
    let mut tile = Array2::<f32>::zeros((chunk.chunk_rows, info.num_cols as usize));
    let mut offset = 0usize;
    for (p, &cols) in info.cols_per_process.iter().enumerate() {
        let cols = cols as usize;
        let start_col = info.output_col_offsets[p] as usize;
        for r in 0..chunk.chunk_rows {
            let src_base = offset + r * cols;
            tile.slice_mut(ndarray::s![r, start_col..start_col + cols])
                .assign(&ndarray::ArrayView1::from(&chunk.data[src_base..src_base + cols]));
        }
        offset += chunk.chunk_rows * cols;
    }
    tile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_it_covers_the_whole_range_with_sizes_differing_by_at_most_one() {
        let chunks = chunk_it(17, 5);
        assert_eq!(chunks.first().unwrap().0, 0);
        assert_eq!(chunks.last().unwrap().1, 17);
        let sizes: Vec<usize> = chunks.iter().map(|(s, e)| e - s).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 17);
        let min = *sizes.iter().min().unwrap();
        let max = *sizes.iter().max().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn chunk_it_handles_exact_division() {
        let chunks = chunk_it(20, 4);
        assert_eq!(chunks, vec![(0, 5), (5, 10), (10, 15), (15, 20)]);
    }

    #[test]
    fn chunk_idx_to_writer_spreads_across_nodes_before_repeating() {
        // 4 nodes, 2 procs/node: chunk 0..3 should each land on a distinct
        // node before any node hosts a second writer.
        let writers: Vec<i32> = (0..4).map(|c| chunk_idx_to_writer(c, 4, 2)).collect();
        let machines: Vec<i32> = writers.iter().map(|&w| w / 2).collect();
        let mut sorted = machines.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 4, "first 4 chunks must land on 4 distinct nodes");
    }

    #[test]
    fn reshape_collected_chunk_respects_per_process_column_ranges() {
        let mut info_args = crate::config::ConvertArgs {
            input_dir: std::path::PathBuf::from("."),
            output_matrix: std::path::PathBuf::from("out.h5"),
            metadata_out: std::path::PathBuf::from("meta.bin"),
            variable: "v".into(),
            time_variable: "time".into(),
            verify_mask: false,
            extended_metadata: false,
            num_writers: 1,
            num_nodes: 1,
            procs_per_node: 1,
            stripe_size: None,
        };
        let info = ProcessInfo {
            args: info_args.clone(),
            rank: 0,
            size: 2,
            files: Vec::new(),
            expected_time_slices: 2,
            num_local_cols: 2,
            cols_per_process: vec![2, 3],
            output_col_offsets: vec![0, 2],
            num_cols: 5,
            time_stamps: Vec::new(),
            missing_locations: Vec::new(),
            observed_locations: Vec::new(),
        };
        info_args.num_writers = 1;

        // rank 0 contributes 2 cols, rank 1 contributes 3 cols, 2 rows.
        let chunk = CollectedChunk {
            data: vec![
                1.0, 2.0, 3.0, 4.0, // rank 0's (2 rows x 2 cols), row-major
                10.0, 11.0, 12.0, 20.0, 21.0, 22.0, // rank 1's (2 rows x 3 cols)
            ],
            chunk_rows: 2,
            output_row_offset: 0,
        };
        let tile = reshape_collected_chunk(&chunk, &info);
        assert_eq!(tile.shape(), &[2, 5]);
        assert_eq!(tile.row(0).to_vec(), vec![1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(tile.row(1).to_vec(), vec![3.0, 4.0, 20.0, 21.0, 22.0]);
    }
}

//! File Discovery & Partition.
//!
//! Lists `.nc` files under the input directory, assigns file *i* to rank
//! `i mod N`, opens each assigned file, and records its local time-slice
//! count.

use std::path::{Path, PathBuf};

use mpi::collective::SystemOperation;
use mpi::topology::SystemCommunicator;
use mpi::traits::*;
use walkdir::WalkDir;

use crate::error::{ConvertError, Result};
use crate::logging;
use crate::process_info::{InputFile, ProcessInfo};

/// Enumerates regular `.nc` files under `dir`, sorted by name for a
/// deterministic, rank-independent file ordering. This ordering is
/// load-bearing: it fixes the global column schedule.
pub fn list_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "nc"))
        .collect();

    if files.is_empty() {
        return Err(ConvertError::NoInputFiles(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Returns the subset of `all_files` assigned to `rank` under `i mod N`
/// partitioning.
pub fn files_for_rank(all_files: &[PathBuf], rank: i32, size: i32) -> Vec<PathBuf> {
    all_files
        .iter()
        .enumerate()
        .filter(|(i, _)| (*i as i32) % size == rank)
        .map(|(_, path)| path.clone())
        .collect()
}

/// Opens every file assigned to this rank and records its declared
/// time-slice count for `variable`. A rank assigned zero files still
/// participates with an empty `files` vector.
pub fn open_assigned_files(
    assigned: &[PathBuf],
    variable: &str,
) -> Result<Vec<InputFile>> {
    assigned
        .iter()
        .map(|path| {
            let handle = netcdf::open(path).map_err(|source| ConvertError::Open {
                path: path.clone(),
                source,
            })?;
            let var = handle
                .variable(variable)
                .ok_or_else(|| ConvertError::MissingVariable(variable.to_string(), path.clone()))?;
            let num_time_slices = var
                .dimensions()
                .first()
                .map(|d| d.len())
                .unwrap_or(0);
            Ok(InputFile {
                path: path.clone(),
                handle,
                num_time_slices,
            })
        })
        .collect()
}

/// Exclusive prefix sum, i.e. `out[i] = sum(values[0..i])`.
pub fn exclusive_prefix_sum(values: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(values.len());
    let mut acc = 0i32;
    for &v in values {
        out.push(acc);
        acc += v;
    }
    out
}

/// Runs the full discovery/partition step: lists files (every rank walks
/// the same directory and sorts identically, so no rank needs to be told
/// the result by another), assigns this rank's subset, opens them,
/// all-reduces the uniform expected time-slice count, and all-gathers the
/// per-rank column counts and offsets.
pub fn discover_and_partition(world: &SystemCommunicator, info: &mut ProcessInfo) -> Result<()> {
    let all_files = list_input_files(&info.args.input_dir)?;
    logging::report(world, &format!("found {} input files, starting to open", all_files.len()));

    let assigned = files_for_rank(&all_files, info.rank, info.size);
    info.files = open_assigned_files(&assigned, &info.args.variable)?;

    let local_max = info.files.iter().map(|f| f.num_time_slices as i32).max().unwrap_or(0);
    let mut expected_time_slices = 0i32;
    world.all_reduce_into(&local_max, &mut expected_time_slices, &SystemOperation::max());
    info.expected_time_slices = expected_time_slices as usize;

    // Every file contributes a uniform `expected_time_slices` columns, short
    // or empty files included; the anomaly policy pads what they're missing.
    info.num_local_cols = info.files.len() * info.expected_time_slices;

    let mut cols_per_process = vec![0i32; info.size as usize];
    world.all_gather_into(&(info.num_local_cols as i32), &mut cols_per_process[..]);
    info.output_col_offsets = exclusive_prefix_sum(&cols_per_process);
    info.num_cols = cols_per_process.iter().map(|&c| c as i64).sum();
    info.cols_per_process = cols_per_process;

    logging::report_barrier(world, "finished opening all files");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sum_is_exclusive() {
        assert_eq!(exclusive_prefix_sum(&[3, 0, 5, 2]), vec![0, 3, 3, 8]);
        assert_eq!(exclusive_prefix_sum(&[]), Vec::<i32>::new());
        assert_eq!(exclusive_prefix_sum(&[7]), vec![0]);
    }

    #[test]
    fn i_mod_n_partitioning_assigns_each_file_once() {
        let files: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("f{i}.nc"))).collect();
        let size = 3;
        let mut total = 0;
        for rank in 0..size {
            total += files_for_rank(&files, rank, size).len();
        }
        assert_eq!(total, files.len());

        // rank 0 gets files 0, 3, 6, 9
        let rank0 = files_for_rank(&files, 0, size);
        assert_eq!(rank0, vec![
            PathBuf::from("f0.nc"),
            PathBuf::from("f3.nc"),
            PathBuf::from("f6.nc"),
            PathBuf::from("f9.nc"),
        ]);
    }

    #[test]
    fn zero_file_rank_contributes_nothing() {
        let files: Vec<PathBuf> = (0..2).map(|i| PathBuf::from(format!("f{i}.nc"))).collect();
        assert!(files_for_rank(&files, 5, 8).is_empty());
    }
}

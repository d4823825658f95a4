//! Level Loader.
//!
//! For a given depth level, reads from every locally held file the
//! (observed-cells x localTimeSlices) slab for the target variable, applies
//! the reference mask, and pastes it into the per-rank per-level buffer.

use mpi::topology::SystemCommunicator;
use ndarray::Array2;

use crate::error::{ConvertError, Result};
use crate::logging;
use crate::mask::ReferenceMask;
use crate::process_info::ProcessInfo;

/// Reads one file's (T_f, numObserved) slab for `level`, applying
/// `mask` along the flattened (H, W) axes.
fn read_observed_slab(
    handle: &netcdf::File,
    variable: &str,
    level: usize,
    mask: &ReferenceMask,
) -> Result<Array2<f32>> {
    let var = handle
        .variable(variable)
        .ok_or_else(|| ConvertError::MissingVariable(variable.to_string(), std::path::PathBuf::new()))?;
    let num_time_slices = var.dimensions().first().map(|d| d.len()).unwrap_or(0);

    if num_time_slices == 0 {
        return Ok(Array2::zeros((mask.num_observed(), 0)));
    }

    let raw = var
        .get_values::<f32, _>((.., level, .., ..))
        .map_err(|source| ConvertError::Netcdf { path: std::path::PathBuf::new(), source })?;

    let cells_per_slice = mask.mask.len();
    let observed = mask.observed_locations();
    let mut out = Array2::<f32>::zeros((observed.len(), num_time_slices));
    for t in 0..num_time_slices {
        let base = t * cells_per_slice;
        for (row, &flat) in observed.iter().enumerate() {
            out[[row, t]] = raw[base + flat as usize];
        }
    }
    Ok(out)
}

/// Applies the short-file anomaly policy: a file reporting 0 time slices
/// contributes zero-filled columns; a file reporting `1 <= n < expected`
/// has its first slice replicated to fill the remaining columns. `expected`
/// is the uniform time-slice count agreed on by every rank
/// (`ProcessInfo::expected_time_slices`), not any single file's own length.
pub fn apply_anomaly_policy(slab: Array2<f32>, expected: usize) -> Array2<f32> {
    let (rows, got) = slab.dim();
    if got == expected {
        return slab;
    }
    let mut out = Array2::<f32>::zeros((rows, expected));
    if got == 0 {
        return out; // zero-fill: no first slice to replicate.
    }
    let first_slice = slab.column(0).to_owned();
    for t in 0..expected {
        out.column_mut(t).assign(&first_slice);
    }
    out
}

/// Loads all observations from the files assigned to this rank at
/// `level`, returning a (numObservedOnLevel x numLocalCols) matrix.
pub fn load_level(
    world: &SystemCommunicator,
    info: &ProcessInfo,
    mask: &ReferenceMask,
    level: usize,
) -> Result<Array2<f32>> {
    let num_observed = mask.num_observed();
    let mut cur_lev_data = Array2::<f32>::zeros((num_observed, info.num_local_cols));
    let expected = info.expected_time_slices;

    let mut col_offset = 0usize;
    for file in &info.files {
        let mut slab = read_observed_slab(&file.handle, &info.args.variable, level, mask)?;
        if slab.dim().1 != expected {
            logging::warn_anomaly(world, &file.path, slab.dim().1, expected);
            slab = apply_anomaly_policy(slab, expected);
        }
        cur_lev_data
            .slice_mut(ndarray::s![.., col_offset..col_offset + expected])
            .assign(&slab);
        col_offset += expected;
    }

    Ok(cur_lev_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_policy_is_identity_when_counts_match() {
        let slab = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let out = apply_anomaly_policy(slab.clone(), 3);
        assert_eq!(out, slab);
    }

    #[test]
    fn anomaly_policy_zero_fills_when_file_has_no_slices() {
        let slab = Array2::<f32>::zeros((2, 0));
        let out = apply_anomaly_policy(slab, 4);
        assert_eq!(out.dim(), (2, 4));
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn anomaly_policy_replicates_first_slice_when_short() {
        let slab = Array2::from_shape_vec((2, 1), vec![7.0, 8.0]).unwrap();
        let out = apply_anomaly_policy(slab, 3);
        assert_eq!(out.dim(), (2, 3));
        for t in 0..3 {
            assert_eq!(out.column(t).to_vec(), vec![7.0, 8.0]);
        }
    }
}

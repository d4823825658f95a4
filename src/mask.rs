//! Mask & Column Census.
//!
//! Derives the reference mask from one time slice of one file, optionally
//! verifies mask invariance everywhere via a serial relay across ranks,
//! and gathers the global timestamp vector.

use mpi::topology::SystemCommunicator;
use mpi::traits::*;
use std::collections::HashSet;

use crate::error::{ConvertError, Result};
use crate::logging;
use crate::process_info::ProcessInfo;

/// The reference missing-cell mask: `mask[i] == true` means flat index `i`
/// (into the H*W grid) is missing/unobserved.
#[derive(Clone)]
pub struct ReferenceMask {
    pub mask: Vec<bool>,
}

impl ReferenceMask {
    pub fn missing_locations(&self) -> Vec<i32> {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(i, _)| i as i32)
            .collect()
    }

    pub fn observed_locations(&self) -> Vec<i32> {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, &m)| !m)
            .map(|(i, _)| i as i32)
            .collect()
    }

    pub fn num_observed(&self) -> usize {
        self.mask.iter().filter(|&&m| !m).count()
    }
}

/// Derives a rank's own local reference mask from the first file it holds.
/// Returns `Ok(None)` for a rank with no files instead of erroring, since a
/// rank assigned zero files is tolerated (its contribution to every
/// downstream collective is simply zero-sized).
pub fn derive_local_mask(info: &ProcessInfo, level: usize) -> Result<Option<ReferenceMask>> {
    match info.files.first() {
        Some(first) => read_mask_for_level(&first.handle, &first.path, &info.args.variable, level).map(Some),
        None => Ok(None),
    }
}

/// Broadcasts the canonical reference mask from rank 0 to every rank. Rank
/// 0 always owns at least one file under `i mod N` partitioning (file index
/// 0 always lands on rank 0), so `local` is only ever `None` on rank 0 if
/// discovery found no input files at all, which is already rejected earlier.
pub fn broadcast_reference_mask(world: &SystemCommunicator, local: Option<&ReferenceMask>) -> ReferenceMask {
    let mut len: i64 = local.map(|m| m.mask.len() as i64).unwrap_or(0);
    world.process_at_rank(0).broadcast_into(&mut len);

    let mut bytes: Vec<u8> = match local {
        Some(m) => m.mask.iter().map(|&b| b as u8).collect(),
        None => vec![0u8; len as usize],
    };
    world.process_at_rank(0).broadcast_into(&mut bytes[..]);

    ReferenceMask { mask: bytes.into_iter().map(|b| b != 0).collect() }
}

pub fn read_mask_for_level(
    handle: &netcdf::File,
    path: &std::path::Path,
    variable: &str,
    level: usize,
) -> Result<ReferenceMask> {
    let var = handle
        .variable(variable)
        .ok_or_else(|| ConvertError::MissingVariable(variable.to_string(), path.to_path_buf()))?;
    let slice = var
        .get_values::<f32, _>((0, level, .., ..))
        .map_err(|source| ConvertError::Netcdf {
            path: path.to_path_buf(),
            source,
        })?;
    let fill_value = var
        .attribute("_FillValue")
        .and_then(|a| a.value().ok())
        .and_then(|v| v.try_into().ok())
        .unwrap_or(f32::MIN);
    let mask = slice.iter().map(|&v| v == fill_value || v.is_nan()).collect();
    Ok(ReferenceMask { mask })
}

/// Set-equality check used both within a rank (every local file/time
/// slice/level) and, via the serial relay below, across ranks.
pub fn masks_match(a: &ReferenceMask, b: &ReferenceMask) -> bool {
    let sa: HashSet<i32> = a.missing_locations().into_iter().collect();
    let sb: HashSet<i32> = b.missing_locations().into_iter().collect();
    sa == sb
}

/// Checks every (file, time slice, level) held by this rank against
/// `reference`. Returns the path of the first file whose mask diverges, if
/// any.
pub fn verify_local_mask(
    info: &ProcessInfo,
    reference: &ReferenceMask,
    num_levels: usize,
) -> Result<Option<std::path::PathBuf>> {
    for file in &info.files {
        for level in 0..num_levels {
            for t in 0..file.num_time_slices {
                let var = file
                    .handle
                    .variable(&info.args.variable)
                    .ok_or_else(|| ConvertError::MissingVariable(info.args.variable.clone(), file.path.clone()))?;
                let slice = var
                    .get_values::<f32, _>((t, level, .., ..))
                    .map_err(|source| ConvertError::Netcdf {
                        path: file.path.clone(),
                        source,
                    })?;
                let fill_value = var
                    .attribute("_FillValue")
                    .and_then(|a| a.value().ok())
                    .and_then(|v| v.try_into().ok())
                    .unwrap_or(f32::MIN);
                let mask: Vec<bool> = slice.iter().map(|&v| v == fill_value || v.is_nan()).collect();
                if !masks_match(&ReferenceMask { mask }, reference) {
                    return Ok(Some(file.path.clone()));
                }
            }
        }
    }
    Ok(None)
}

/// Cross-rank verification via a serial relay: each non-root rank sends its
/// local missing-location set to root in rank order, and root compares
/// against its own.
pub fn verify_cross_rank(world: &SystemCommunicator, info: &ProcessInfo, local: &ReferenceMask) -> Result<()> {
    let root_process = world.process_at_rank(0);
    let local_locations = local.missing_locations();

    if info.rank == 0 {
        let mut reference = local_locations.clone();
        reference.sort_unstable();
        for sender in 1..info.size {
            let (received, _status): (Vec<i32>, _) = world.process_at_rank(sender).receive_vec();
            let mut sorted = received;
            sorted.sort_unstable();
            if sorted != reference {
                return Err(ConvertError::MaskMismatch {
                    rank: sender,
                    file: std::path::PathBuf::from("<cross-rank mask relay>"),
                });
            }
        }
    } else {
        root_process.send(&local_locations[..]);
    }
    Ok(())
}

/// Runs the full census: derives the reference mask, optionally verifies it
/// (locally then across ranks via the serial relay), and records
/// `missingLocations`/`observedLocations` on `info`. Concatenates this
/// rank's per-file timestamps in local file order.
pub fn run_census(
    world: &SystemCommunicator,
    info: &mut ProcessInfo,
    num_levels: usize,
    time_variable: &str,
) -> Result<ReferenceMask> {
    let local_mask = derive_local_mask(info, 0)?;
    let reference = broadcast_reference_mask(world, local_mask.as_ref());

    if info.args.verify_mask {
        logging::report_barrier(world, "verifying that the missing mask is the same for all observations");
        if let Some(bad_file) = verify_local_mask(info, &reference, num_levels)? {
            return Err(ConvertError::MaskMismatch { rank: info.rank, file: bad_file });
        }
        // Ranks with no files have nothing of their own to relay; they
        // simply echo the already-agreed reference back, which always
        // matches.
        let to_relay = local_mask.as_ref().unwrap_or(&reference);
        verify_cross_rank(world, info, to_relay)?;
    }

    info.missing_locations = reference.missing_locations();
    info.observed_locations = reference.observed_locations();

    let mut time_stamps = Vec::with_capacity(info.num_local_cols);
    for file in &info.files {
        let var = file
            .handle
            .variable(time_variable)
            .ok_or_else(|| ConvertError::MissingVariable(time_variable.to_string(), file.path.clone()))?;
        let values = var
            .get_values::<f64, _>(..)
            .map_err(|source| ConvertError::Netcdf { path: file.path.clone(), source })?;
        time_stamps.extend(values.iter().map(|&v| v.round() as i64));
    }
    info.time_stamps = time_stamps;

    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(missing: &[usize], len: usize) -> ReferenceMask {
        let mut mask = vec![false; len];
        for &i in missing {
            mask[i] = true;
        }
        ReferenceMask { mask }
    }

    #[test]
    fn missing_and_observed_are_complementary() {
        let m = mask_from(&[0, 4], 6);
        assert_eq!(m.missing_locations(), vec![0, 4]);
        assert_eq!(m.observed_locations(), vec![1, 2, 3, 5]);
        assert_eq!(m.num_observed(), 4);
    }

    #[test]
    fn masks_match_ignores_order() {
        let a = mask_from(&[0, 4], 6);
        let b = mask_from(&[4, 0], 6);
        assert!(masks_match(&a, &b));
    }

    #[test]
    fn masks_match_detects_divergence() {
        let a = mask_from(&[0, 4], 6);
        let b = mask_from(&[0, 5], 6);
        assert!(!masks_match(&a, &b));
    }
}

//! Metadata Emitter + coordinate join.
//!
//! On rank 0, concatenates per-rank timestamp vectors and writes the
//! sidecar metadata archive.
//!
//! The archive format is a single `bincode`-serialized `MetadataRecord`:
//! one typed struct standing in for "one archive, several named arrays".

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use mpi::topology::SystemCommunicator;
use mpi::traits::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mask::ReferenceMask;
use crate::process_info::ProcessInfo;

/// One row's geographic coordinates, as produced by the coordinate join.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCoordinate {
    pub lat: f32,
    pub lon: f32,
    pub level_number: i32,
    /// Flat (level * H * W + lat_idx * W + lon_idx) index into the original
    /// 4-D grid, so a row can always be unfolded back to its 3-D origin.
    pub flat_location: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub missing_locations: Vec<i32>,
    pub time_stamps: Vec<i64>,

    // Extended fields, populated only when `--extended-metadata` is set.
    pub observed_lat_coords: Vec<f32>,
    pub observed_lon_coords: Vec<f32>,
    pub observed_level_numbers: Vec<i32>,
    pub observed_locations: Vec<i64>,
    pub lat_list: Vec<f32>,
    pub lon_list: Vec<f32>,
    pub depth_list: Vec<f32>,
}

/// Unflattens the reference mask's observed indices into (lat, lon, level)
/// triples using one file's axis coordinate vectors, for every level 0..L.
pub fn join_coordinates(
    mask: &ReferenceMask,
    lat_coords: &[f32],
    lon_coords: &[f32],
    num_levels: usize,
) -> Vec<RowCoordinate> {
    let num_lats = lat_coords.len();
    let num_lons = lon_coords.len();
    let observed = mask.observed_locations();

    let mut rows = Vec::with_capacity(observed.len() * num_levels);
    for level in 0..num_levels {
        for &flat in &observed {
            let flat = flat as usize;
            let lat_idx = flat / num_lons;
            let lon_idx = flat % num_lons;
            debug_assert!(lat_idx < num_lats);
            let flat_location = (level * num_lats * num_lons + flat) as i64;
            rows.push(RowCoordinate {
                lat: lat_coords[lat_idx],
                lon: lon_coords[lon_idx],
                level_number: level as i32,
                flat_location,
            });
        }
    }
    rows
}

/// Builds the depth list for the archive from raw level indices, optionally
/// translating through a depth-in-meters lookup table. The table is
/// optional and falls back to the raw level index when absent.
pub fn build_depth_list(num_levels: usize, depth_lookup: Option<&dyn Fn(i32) -> f32>) -> Vec<f32> {
    (0..num_levels as i32)
        .map(|level| depth_lookup.map(|f| f(level)).unwrap_or(level as f32))
        .collect()
}

/// Gathers every rank's local timestamp vector at root and, on root,
/// concatenates them in rank order. Column `c` in the output matrix always
/// corresponds to the timestamp at the same offset in this vector.
pub fn gather_time_stamps(world: &SystemCommunicator, info: &ProcessInfo) -> Option<Vec<i64>> {
    use mpi::datatype::PartitionMut;

    let root = world.process_at_rank(0);
    let mut counts = vec![0i32; info.size as usize];
    world.all_gather_into(&(info.time_stamps.len() as i32), &mut counts[..]);

    if info.rank == 0 {
        let displs = crate::discovery::exclusive_prefix_sum(&counts);
        let total: i32 = counts.iter().sum();
        let mut all = vec![0i64; total as usize];
        let mut partition = PartitionMut::new(&mut all, counts, displs);
        root.gather_varcount_into_root(&info.time_stamps[..], &mut partition);
        Some(all)
    } else {
        root.gather_varcount_into(&info.time_stamps[..]);
        None
    }
}

/// Writes the `MetadataRecord` archive. Only rank 0 calls this, after the
/// census has populated every field.
pub fn write_metadata(path: &Path, record: &MetadataRecord) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, record)?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> Result<MetadataRecord> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let record = bincode::deserialize_from(reader)?;
    Ok(record)
}

/// Filters row indices by latitude/longitude/level, the shape of query a
/// downstream visualization tool would run against this archive's
/// extended fields.
pub fn extract_region(
    record: &MetadataRecord,
    lats: &[f32],
    lons: &[f32],
    level_indices: &[i32],
) -> Vec<usize> {
    (0..record.observed_lat_coords.len())
        .filter(|&i| {
            lats.contains(&record.observed_lat_coords[i])
                && lons.contains(&record.observed_lon_coords[i])
                && level_indices.contains(&record.observed_level_numbers[i])
        })
        .collect()
}

/// Filters row indices to a contiguous depth-level range, the selection a
/// thermocline-focused subsetter would apply against this archive.
pub fn thermocline_subset(record: &MetadataRecord, levels_to_keep: std::ops::Range<i32>) -> Vec<usize> {
    (0..record.observed_level_numbers.len())
        .filter(|&i| levels_to_keep.contains(&record.observed_level_numbers[i]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::ReferenceMask;

    fn sample_mask() -> ReferenceMask {
        // 2x3 grid (H=2, W=3), cell (0,0) masked.
        ReferenceMask { mask: vec![true, false, false, false, false, false] }
    }

    #[test]
    fn coordinate_join_unflattens_in_level_major_order() {
        let mask = sample_mask();
        let lat = vec![10.0, 20.0];
        let lon = vec![100.0, 110.0, 120.0];
        let rows = join_coordinates(&mask, &lat, &lon, 2);

        // 5 observed cells per level, 2 levels -> 10 rows, level-major.
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].level_number, 0);
        assert_eq!(rows[5].level_number, 1);

        // first observed flat index is 1 -> (lat_idx=0, lon_idx=1)
        assert_eq!(rows[0].lat, 10.0);
        assert_eq!(rows[0].lon, 110.0);
    }

    #[test]
    fn depth_list_falls_back_to_raw_level_when_no_lookup() {
        let list = build_depth_list(3, None);
        assert_eq!(list, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn depth_list_uses_lookup_when_supplied() {
        let lookup = |level: i32| (level as f32) * 10.0;
        let list = build_depth_list(3, Some(&lookup));
        assert_eq!(list, vec![0.0, 10.0, 20.0]);
    }

    #[test]
    fn thermocline_subset_keeps_only_requested_levels() {
        let mut record = MetadataRecord::default();
        record.observed_level_numbers = vec![0, 5, 9, 20, 39];
        let kept = thermocline_subset(&record, 9..40);
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn extract_region_matches_on_all_three_axes() {
        let mut record = MetadataRecord::default();
        record.observed_lat_coords = vec![10.0, 10.0, 20.0];
        record.observed_lon_coords = vec![100.0, 110.0, 100.0];
        record.observed_level_numbers = vec![3, 3, 5];
        let kept = extract_region(&record, &[10.0], &[100.0, 110.0], &[3, 5]);
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn metadata_round_trips_through_bincode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.bin");
        let mut record = MetadataRecord::default();
        record.missing_locations = vec![0, 4];
        record.time_stamps = vec![100, 200, 300];

        write_metadata(&path, &record).unwrap();
        let loaded = read_metadata(&path).unwrap();
        assert_eq!(loaded.missing_locations, record.missing_locations);
        assert_eq!(loaded.time_stamps, record.time_stamps);
    }
}

//! Process Orchestrator: ties every component into the level-by-level
//! conversion loop and drives the collective calls that keep every rank in
//! lockstep.

use mpi::topology::SystemCommunicator;
use mpi::traits::*;

use crate::config::ConvertArgs;
use crate::dataset;
use crate::discovery;
use crate::error::{ConvertError, Result};
use crate::level_loader;
use crate::logging;
use crate::mask;
use crate::metadata::{self, MetadataRecord};
use crate::process_info::{self, ProcessInfo};
use crate::redistribute;
use crate::writer;

/// Reads the level-dimension length (dims ordered time, level, lat, lon) on
/// rank 0 and broadcasts it, so every rank agrees even when it owns no
/// files itself. Rank 0 always owns at least one file under `i mod N`
/// partitioning (file index 0 always lands on rank 0), and that file is
/// already known to carry the target variable from file discovery.
fn num_levels(world: &SystemCommunicator, info: &ProcessInfo) -> usize {
    let local: i64 = if info.rank == 0 {
        let first = info.files.first().expect("rank 0 owns file index 0");
        let var = first
            .handle
            .variable(&info.args.variable)
            .expect("target variable presence already validated during file discovery");
        var.dimensions().get(1).map(|d| d.len()).unwrap_or(1) as i64
    } else {
        0
    };
    process_info::broadcast_i64(world, local) as usize
}

fn lat_lon_coords(info: &ProcessInfo) -> Result<(Vec<f32>, Vec<f32>)> {
    let first = info
        .files
        .first()
        .ok_or_else(|| ConvertError::Config("rank has no files to read coordinate axes from".into()))?;
    let lat = first
        .handle
        .variable("lat")
        .ok_or_else(|| ConvertError::MissingVariable("lat".into(), first.path.clone()))?
        .get_values::<f32, _>(..)
        .map_err(|source| ConvertError::Netcdf { path: first.path.clone(), source })?;
    let lon = first
        .handle
        .variable("lon")
        .ok_or_else(|| ConvertError::MissingVariable("lon".into(), first.path.clone()))?
        .get_values::<f32, _>(..)
        .map_err(|source| ConvertError::Netcdf { path: first.path.clone(), source })?;
    Ok((lat.to_vec(), lon.to_vec()))
}

/// Runs the full conversion: discovery, census, collective dataset creation,
/// the per-level load/gather/write loop, and metadata emission on rank 0.
pub fn run(world: &SystemCommunicator, args: ConvertArgs) -> Result<()> {
    let mut info = ProcessInfo::new(args, world);

    discovery::discover_and_partition(world, &mut info)?;

    let levels = num_levels(world, &info);
    let reference_mask = mask::run_census(world, &mut info, levels, &info.args.time_variable.clone())?;

    let num_rows_per_level = info.num_rows_per_level();
    let total_rows = num_rows_per_level * levels;

    logging::report_barrier(world, "creating output dataset");
    let out_file = dataset::create_output_dataset(
        world,
        &info.args.output_matrix,
        total_rows,
        info.num_cols as usize,
        info.args.stripe_size,
    )?;
    let out_dataset = dataset::open_rows_dataset(&out_file)?;

    for level in 0..levels {
        logging::report(world, &format!("loading level {level}/{levels}"));
        let cur_lev_data = level_loader::load_level(world, &info, &reference_mask, level)?;

        world.barrier();
        let collected = redistribute::gather_to_writers(world, &info, &cur_lev_data.view());
        world.barrier();

        let level_start_row = level * num_rows_per_level;
        for chunk in &collected {
            let tile = redistribute::reshape_collected_chunk(chunk, &info);
            writer::write_chunk(&out_dataset, chunk, &tile, level_start_row)?;
        }
        world.barrier();
    }

    if info.rank == 0 {
        logging::report(world, "writing metadata archive");
        let mut record = MetadataRecord {
            missing_locations: info.missing_locations.clone(),
            time_stamps: Vec::new(),
            ..Default::default()
        };
        if info.args.extended_metadata {
            let (lat_coords, lon_coords) = lat_lon_coords(&info)?;
            let rows = metadata::join_coordinates(&reference_mask, &lat_coords, &lon_coords, levels);
            record.observed_lat_coords = rows.iter().map(|r| r.lat).collect();
            record.observed_lon_coords = rows.iter().map(|r| r.lon).collect();
            record.observed_level_numbers = rows.iter().map(|r| r.level_number).collect();
            record.observed_locations = rows.iter().map(|r| r.flat_location).collect();
            record.lat_list = lat_coords;
            record.lon_list = lon_coords;
            record.depth_list = metadata::build_depth_list(levels, None);
        }
        if let Some(all_time_stamps) = metadata::gather_time_stamps(world, &info) {
            record.time_stamps = all_time_stamps;
        }
        metadata::write_metadata(&info.args.metadata_out, &record)?;
    } else {
        metadata::gather_time_stamps(world, &info);
    }

    logging::report_barrier(world, "conversion complete");
    Ok(())
}

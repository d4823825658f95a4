use clap::Parser;
use mpi::traits::*;

use oceanmat::config::{Cli, Commands};
use oceanmat::logging;
use oceanmat::process_info;

fn main() {
    let cli = Cli::parse();
    let universe = mpi::initialize().expect("failed to initialize MPI");
    let world = universe.world();

    logging::init(&cli.verbosity);

    let Commands::Convert(args) = cli.command;

    if let Err(err) = args.validate() {
        process_info::abort_on_fatal(&world, &err);
    }

    if let Err(err) = oceanmat::orchestrator::run(&world, args) {
        process_info::abort_on_fatal(&world, &err);
    }
}

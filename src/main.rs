use std::process::ExitCode;

use clap::Parser;

use paintcore::cli::{self, CliArgs};
use paintcore::{log_info, logger};

fn main() -> ExitCode {
    logger::init();
    log_info!("PaintCore {} starting", env!("CARGO_PKG_VERSION"));

    let args = CliArgs::parse();
    let code = cli::run(args);

    log_info!("PaintCore exiting");
    code
}

pub mod cli;
pub mod commands;
pub mod utils;

use clap::Parser;
use cli::Typeswap;
use commands::handle_command;
use std::process;
use utils::init_logging;

/// Run the typeswap CLI application
pub fn run_main() {
    let args = Typeswap::parse();
    init_logging(args.verbose);

    if let Err(e) = handle_command(args.commands) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

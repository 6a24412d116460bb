//! Binary for aigsat

#![warn(missing_docs)]

mod cmd;

use clap::Parser;
use env_logger::Env;

#[doc(hidden)]
fn main() {
    // Log level selectable with RUST_LOG, e.g. `RUST_LOG=debug`
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = cmd::Cli::parse();

    match cli.command {
        cmd::Commands::Show(a) => a.run(),
        cmd::Commands::Cube(a) => a.run(),
        cmd::Commands::Solve(a) => a.run(),
        cmd::Commands::SolveExternal(a) => a.run(),
    }
}

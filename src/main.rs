use clap::Parser;
use kpiboard::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}

//! Command-line driver for the Scatha compiler (spec §4.10 "Driver", §8
//! "CLI surface"). A thin `clap` front-end, grounded on
//! `seen_cli/src/main.rs`'s `Parser`/`Subcommand` shape and its
//! dispatch-to-a-`commands::*::execute`-function style, scaled down to the
//! single `compile` subcommand this workspace's pipeline supports.

use clap::{Parser, Subcommand};

mod compile;
mod invocation;

#[derive(Parser)]
#[command(name = "scatha")]
#[command(about = "The Scatha compiler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile IR modules into a Scatha binary.
    Compile(compile::CompileArgs),
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Compile(args) => compile::execute(args),
    };
    std::process::exit(exit_code);
}

//! Process wrapper CLI

use clap::Parser;
use runwrap::launcher::{self, Config};

#[derive(Parser)]
#[command(name = "runwrap")]
#[command(
    about = "Run a program under resource limits and report how it terminated",
    long_about = None
)]
struct Cli {
    /// Path of the program to execute
    program: String,

    /// Arguments passed to the program verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    // Default to errors only: stderr is a pipe owned by the invoking
    // platform and captured alongside the child's output, so diagnostics
    // are opt-in via RUST_LOG.
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("error"));

    let cli = Cli::parse();
    launcher::run(Config::from_env(cli.program, cli.args))
}

mod cli;
mod droplets;
mod editor;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(args)) => run::print_config(&cli.run, &args),
        None => run::run(cli.run),
    }
}

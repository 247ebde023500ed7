//! `pilot` command-line entry point.

use clap::Parser;

use pilot::cli::{Cli, execute};

fn main() {
    pilot::logging::init();
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}

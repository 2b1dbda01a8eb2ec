//! pdiff: perceptual-diff screenshot tests
//!
//! ## Usage
//!
//! ```bash
//! pdiff list tests/                  # Show matched tests
//! pdiff test tests/ -f about,index   # Compare against baselines
//! pdiff update tests/ -c home        # Rewrite baselines
//! pdiff interactive tests/           # Step through pages in a visible browser
//! ```

use clap::Parser;
use pdiff_cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    match pdiff_cli::execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

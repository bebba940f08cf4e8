//! cstore - Inspect and edit a collection store from the command line

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = critical_store::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

//! Entry point for the Trellis plugin daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match trellisd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "daemon exited with an error");
            drop(writeln!(io::stderr().lock(), "trellisd: {error}"));
            ExitCode::FAILURE
        }
    }
}

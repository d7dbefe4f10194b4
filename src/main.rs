//! slixtools - image, GIF and PDF processing from the command line
//!
//! ## Commands
//!
//! - `slixtools validate` - Check a file against size and format rules
//! - `slixtools pages` - Expand a page reference list
//! - `slixtools image resize|compress|convert` - Image operations
//! - `slixtools gif` - Build an animated GIF from still images
//! - `slixtools pdf info|extract|delete|reorder|rotate|merge` - PDF operations
//! - `slixtools completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Resize a photo into a 800x600 box
//! slixtools image resize photo.jpg --width 800 --height 600
//!
//! # Keep pages 1-3 and 5 of a report
//! slixtools pdf extract report.pdf --pages 1-3,5 -o out/
//!
//! # Generate shell completions
//! slixtools completions bash > /etc/bash_completion.d/slixtools
//! ```
//!
//! Set `SLIXTOOLS_VERBOSE` to print a JSON diagnostic report on failure.

use slixtools::diagnostics::DiagnosticReport;
use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = DiagnosticReport::from_anyhow(&e);
            eprintln!("Error: {e:#}");
            eprintln!("{}", report.category.title());
            for suggestion in &report.suggestions {
                eprintln!("  - {suggestion}");
            }
            if std::env::var("SLIXTOOLS_VERBOSE").is_ok() {
                match report.to_json() {
                    Ok(json) => eprintln!("{json}"),
                    Err(_) => eprintln!("{e:?}"),
                }
            }
            ExitCode::FAILURE
        }
    }
}

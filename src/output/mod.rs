mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::bright_green;
use styling::{dim, magenta_bold};
pub use summary::print_summary;

/// Prints the `ci-artifacts` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("📦 ci-artifacts"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab CI artifact collector")
    );
}

mod progress;
mod styling;
mod summary;
mod tables;
mod writer;

pub use progress::GatherProgress;
pub use styling::{blue_bold, dim};
pub use summary::SummarySink;
pub use writer::MetricWriter;

/// Prints the `bbpulse` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        blue_bold("📈 bbpulse"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Bitbucket pull request metrics")
    );
}

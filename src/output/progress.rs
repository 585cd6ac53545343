use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_red, bright_yellow};

/// Spinner shown on stderr while a gather cycle runs
pub struct GatherProgress {
    pb: ProgressBar,
}

impl GatherProgress {
    pub fn start(owner: &str, gather_type: &str) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Gather").underlined());
        let pb = create_spinner(
            bright_yellow(format!("Collecting pull requests for {owner} ({gather_type})"))
                .to_string(),
        );
        Self { pb }
    }

    pub fn finish(self, records: usize, errors: usize) {
        let message = if errors == 0 {
            bright_green(format!("Collected {records} pull requests ✓")).to_string()
        } else {
            bright_red(format!(
                "Collected {records} pull requests, {errors} errors ✗"
            ))
            .to_string()
        };
        self.pb.finish_with_message(message);
        eprintln!();
    }

    pub fn abandon(self, reason: &str) {
        self.pb
            .abandon_with_message(bright_red(format!("Gather failed: {reason} ✗")).to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

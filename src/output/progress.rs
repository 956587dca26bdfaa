use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use super::styling::{bright, bright_yellow, done, failed};

const ACQUIRE: &str = "Phase 1/2: Finding jobs with the requested artifacts";
const COLLECT: &str = "Phase 2/2: Waiting for jobs and downloading artifacts";

/// Spinner for the two phases of a run.
///
/// The message after the spinner belongs to the run's heartbeat.
pub struct PhaseProgress {
    pb: ProgressBar,
    phase: &'static str,
}

impl PhaseProgress {
    pub fn start_acquire() -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        Self {
            pb: create_spinner(ACQUIRE),
            phase: ACQUIRE,
        }
    }

    pub fn finish_acquire_start_collect(self, pipeline_id: u64) -> Self {
        self.finish(format!("Phase 1/2: Jobs found in pipeline {pipeline_id}"));
        Self {
            pb: create_spinner(COLLECT),
            phase: COLLECT,
        }
    }

    pub fn finish_collect(self, downloaded: usize) {
        self.finish(format!("Phase 2/2: Downloaded {downloaded} artifact(s)"));
        eprintln!();
    }

    /// Stop the spinner, marking the current phase as failed.
    pub fn fail(self) {
        self.pb.set_prefix(failed(self.phase).to_string());
        self.pb.abandon_with_message("");
        eprintln!();
    }

    /// Handle the heartbeat writes its status line to.
    pub fn bar(&self) -> ProgressBar {
        self.pb.clone()
    }

    fn finish(&self, label: String) {
        self.pb.set_prefix(done(label).to_string());
        self.pb.finish_with_message("");
    }
}

fn create_spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {prefix} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(bright_yellow(label).to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

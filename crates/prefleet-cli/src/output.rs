//! Terminal output: indicatif transfer bars and the abort confirmation.

use std::collections::HashMap;
use std::sync::Mutex;

use dialoguer::Confirm;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use prefleet::{ConfirmAbort, ProgressSink, TransferJob};

const BAR_TEMPLATE: &str = "{msg:12} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// One progress bar per tracked transfer job.
pub struct BarSink {
    multi: MultiProgress,
    bars: Mutex<HashMap<i64, ProgressBar>>,
}

impl BarSink {
    pub fn new() -> Self {
        BarSink {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

impl ProgressSink for BarSink {
    fn job_started(&self, job: &TransferJob) {
        let bar = self.multi.add(ProgressBar::new(job.size_estimated_bytes));
        bar.set_style(Self::style());
        bar.set_message(format!("job #{}", job.id));
        bar.set_position(job.size_progress_bytes);
        self.bars.lock().unwrap().insert(job.id, bar);
    }

    fn job_progress(&self, job: &TransferJob, _delta: u64) {
        if let Some(bar) = self.bars.lock().unwrap().get(&job.id) {
            // The estimate firms up after the remote has sized the job.
            if job.size_estimated_bytes > 0 {
                bar.set_length(job.size_estimated_bytes);
            }
            bar.set_position(job.size_progress_bytes);
        }
    }

    fn finished(&self) {
        for bar in self.bars.lock().unwrap().values() {
            bar.finish();
        }
    }
}

/// Sink for waits where no progress display was requested.
pub struct QuietSink;

impl ProgressSink for QuietSink {
    fn job_started(&self, _job: &TransferJob) {}
    fn job_progress(&self, _job: &TransferJob, _delta: u64) {}
    fn finished(&self) {}
}

/// Interactive yes/no prompt for aborting running jobs, bypassed by
/// `--yes`.
pub struct PromptConfirm {
    pub assume_yes: bool,
}

impl ConfirmAbort for PromptConfirm {
    fn confirm_abort(&self) -> bool {
        if self.assume_yes {
            return true;
        }
        Confirm::new()
            .with_prompt("Abort running transfer jobs?")
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

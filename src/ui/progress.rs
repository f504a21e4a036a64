use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner shown while a cage's rows are being rewritten.
pub struct SavingSpinner {
    bar: ProgressBar,
}

impl SavingSpinner {
    pub fn start(cage_num: i32) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        bar.set_message(format!("Updating cage {}...", cage_num));
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Remove the spinner; the caller reports the result on stdout.
    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

use indicatif::ProgressBar;
use std::time::Duration;

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if console::Term::stdout().is_term() && !crate::output::is_quiet() {
            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message.to_string());
        Self { pb }
    }

    /// Remove the spinner line without leaving a message
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }
}

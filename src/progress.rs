//
// progress.rs
// dicom-anon
//
// Progress notifications emitted by the batch driver. Closures are sinks, and the CLI renders
// events with an indicatif bar.
//

use indicatif::{ProgressBar, ProgressStyle};

/// Template for the batch progress bar.
pub const BATCH_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Files found under all patient directories.
    Counted { total: u64 },
    PatientStarted { patient_id: u64, anon_dir: String },
    FileProcessed { processed: u64, total: u64 },
    Status(String),
}

pub trait ProgressSink {
    fn notify(&mut self, event: ProgressEvent);
}

impl<F: FnMut(ProgressEvent)> ProgressSink for F {
    fn notify(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&mut self, _event: ProgressEvent) {}
}

/// Terminal progress bar sink.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(BATCH_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn notify(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Counted { total } => {
                self.bar.set_length(total);
                self.bar.set_message(format!("Found {total} files."));
            }
            ProgressEvent::PatientStarted { patient_id, anon_dir } => {
                self.bar
                    .set_message(format!("Processing patient ID {patient_id} -> {anon_dir}"));
            }
            ProgressEvent::FileProcessed { processed, .. } => self.bar.set_position(processed),
            ProgressEvent::Status(message) => self.bar.set_message(message),
        }
    }
}

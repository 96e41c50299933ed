//! Monotonic progress notifications.

use log::debug;

pub const PREPARING: u8 = 0;
pub const LOADING_IMAGES: u8 = 5;
pub const IMAGES_READY: u8 = 20;
pub const MEASURED: u8 = 30;
pub const PAGINATED: u8 = 40;
pub const PAGES_RENDERED: u8 = 90;
pub const ASSEMBLING: u8 = 92;
pub const DONE: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
}

pub type ProgressCallback = Box<dyn FnMut(&ProgressEvent) + Send>;

/// Best-effort, synchronous progress for one invocation. Never reports a
/// lower percent than it already has.
#[derive(Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: Option<u8>,
}

impl ProgressReporter {
    pub fn new(callback: impl FnMut(&ProgressEvent) + Send + 'static) -> Self {
        ProgressReporter {
            callback: Some(Box::new(callback)),
            last: None,
        }
    }

    /// Logs only.
    pub fn silent() -> Self {
        ProgressReporter::default()
    }

    pub fn report(&mut self, percent: u8, message: impl Into<String>) {
        let percent = percent.min(DONE).max(self.last.unwrap_or(0));
        self.last = Some(percent);

        let event = ProgressEvent {
            percent,
            message: message.into(),
        };
        debug!("progress {:>3}% {}", event.percent, event.message);
        if let Some(callback) = self.callback.as_mut() {
            callback(&event);
        }
    }

    /// Report step `done` of `total` within `from..=to`.
    pub fn step(&mut self, from: u8, to: u8, done: usize, total: usize, message: impl Into<String>) {
        let span = to.saturating_sub(from) as usize;
        let offset = if total == 0 { span } else { span * done.min(total) / total };
        self.report(from + offset as u8, message);
    }
}

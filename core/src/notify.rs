use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

fn suppression_window() -> Duration {
    Duration::seconds(5)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Collects user-facing notices and drops duplicates: a message identical to
/// the previous one within the window is suppressed, for success and error
/// alike.
#[derive(Default)]
pub struct Notifier {
    last: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the notice to show, or `None` when it was suppressed as a
    /// duplicate.
    pub fn push(&self, kind: NoticeKind, message: impl Into<String>) -> Option<Notice> {
        self.push_at(kind, message, Utc::now())
    }

    pub fn push_at(
        &self,
        kind: NoticeKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<Notice> {
        let message = message.into();
        let mut last = self.last.lock();
        if let Some((previous, shown_at)) = last.as_ref() {
            if previous == &message && now < *shown_at + suppression_window() {
                return None;
            }
        }
        *last = Some((message.clone(), now));
        Some(Notice { kind, message })
    }
}

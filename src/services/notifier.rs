use std::time::Duration;

use tokio::sync::broadcast;

/// How long a notice stays visible before consumers auto-dismiss it.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

/// A transient, user-facing notification. Every failure surfaces exactly
/// one of these; they carry no retry semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(32);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(NoticeKind::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NoticeKind::Error, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NoticeKind::Info, message.into());
    }

    fn emit(&self, kind: NoticeKind, message: String) {
        // Nobody listening is fine; notices are fire-and-forget.
        let _ = self.tx.send(Notice { kind, message });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

use chrono::{DateTime, Utc};

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ExchangeEventKind {
    /// A key read from the peripheral that the store did not know yet.
    KeyAdded { index: usize, fingerprint: String },
    /// A store key written to the peripheral.
    KeyUploaded { index: usize, fingerprint: String },
    SessionCompleted,
    SessionFailed { reason: String },
}

impl ExchangeEventKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        use ExchangeEventKind::{KeyAdded, KeyUploaded, SessionCompleted, SessionFailed};
        match self {
            KeyAdded { .. } => "key_added",
            KeyUploaded { .. } => "key_uploaded",
            SessionCompleted => "session_completed",
            SessionFailed { .. } => "session_failed",
        }
    }

    #[must_use]
    pub fn key_index(&self) -> Option<usize> {
        match self {
            ExchangeEventKind::KeyAdded { index, .. }
            | ExchangeEventKind::KeyUploaded { index, .. } => Some(*index),
            _ => None,
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            ExchangeEventKind::KeyAdded { fingerprint, .. }
            | ExchangeEventKind::KeyUploaded { fingerprint, .. } => Some(fingerprint.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            ExchangeEventKind::SessionFailed { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

/// Something that happened while exchanging keys with one peripheral.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ExchangeEvent {
    pub date_time: DateTime<Utc>,
    pub peripheral: String,
    pub kind: ExchangeEventKind,
}

impl ExchangeEvent {
    pub fn new(date_time: DateTime<Utc>, peripheral: String, kind: ExchangeEventKind) -> ExchangeEvent {
        ExchangeEvent {
            date_time,
            peripheral,
            kind,
        }
    }
}

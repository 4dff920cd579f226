//! Server-originated realtime payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    #[default]
    Info,
    Warning,
}

/// A notice rendered by the client's notification tray.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Warning,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Events the server pushes over a realtime connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A notice to show to the user.
    Notification { notice: Notice },
}

impl ServerEvent {
    pub fn notification(notice: Notice) -> Self {
        Self::Notification { notice }
    }

    /// The acknowledgment sent once on every freshly upgraded connection.
    pub fn connected() -> Self {
        Self::notification(Notice::info("Connected", "Realtime link is live."))
    }

    /// Encode as a JSON text payload.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

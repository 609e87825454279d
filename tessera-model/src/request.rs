use crate::task::{CorrelationIds, TaskKind};

/// Caller-facing request to materialize a remote asset locally.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThumbnailRequest {
    pub url: String,
    pub kind: TaskKind,
    pub correlation: CorrelationIds,
}

impl ThumbnailRequest {
    pub fn new(
        url: impl Into<String>,
        kind: TaskKind,
        correlation: CorrelationIds,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            correlation,
        }
    }

    pub fn image(
        url: impl Into<String>,
        message_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Self {
        Self::new(
            url,
            TaskKind::Image,
            CorrelationIds::new(message_id, room_id),
        )
    }

    pub fn video(
        url: impl Into<String>,
        message_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Self {
        Self::new(
            url,
            TaskKind::Video,
            CorrelationIds::new(message_id, room_id),
        )
    }

    pub fn emoji(
        url: impl Into<String>,
        message_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Self {
        Self::new(
            url,
            TaskKind::Emoji,
            CorrelationIds::new(message_id, room_id),
        )
    }
}

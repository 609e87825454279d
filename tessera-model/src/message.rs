use std::path::PathBuf;

use crate::task::{CorrelationIds, TaskKind};

/// Field of a message body that receives the local path of a cached asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageBodyField {
    /// Emoji bodies point straight at the cached file.
    LocalPath,
    /// Image and video bodies keep their remote url and gain a thumbnail.
    ThumbnailPath,
}

impl MessageBodyField {
    /// JSON key used by message bodies.
    pub const fn key(self) -> &'static str {
        match self {
            MessageBodyField::LocalPath => "localPath",
            MessageBodyField::ThumbnailPath => "thumbnailPath",
        }
    }
}

impl From<TaskKind> for MessageBodyField {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Emoji => MessageBodyField::LocalPath,
            TaskKind::Image | TaskKind::Video => MessageBodyField::ThumbnailPath,
        }
    }
}

/// Notification sent to the message store after a successful cache fill.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessagePatch {
    pub message_id: String,
    pub room_id: String,
    pub kind: TaskKind,
    pub path: PathBuf,
}

impl MessagePatch {
    pub fn new(
        correlation: &CorrelationIds,
        kind: TaskKind,
        path: PathBuf,
    ) -> Self {
        Self {
            message_id: correlation.message_id.clone(),
            room_id: correlation.room_id.clone(),
            kind,
            path,
        }
    }

    pub fn field(&self) -> MessageBodyField {
        self.kind.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_patches_local_path_and_media_patches_thumbnail() {
        let ids = CorrelationIds::new("m", "r");
        let emoji = MessagePatch::new(&ids, TaskKind::Emoji, "/a".into());
        let video = MessagePatch::new(&ids, TaskKind::Video, "/b".into());
        assert_eq!(emoji.field().key(), "localPath");
        assert_eq!(video.field().key(), "thumbnailPath");
    }
}

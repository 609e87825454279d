use std::path::PathBuf;

use crate::task::TaskKind;

/// Terminal transition broadcast to cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "event", rename_all = "snake_case"))]
pub enum ThumbnailEvent {
    Completed {
        url: String,
        kind: TaskKind,
        path: PathBuf,
    },
    Failed {
        url: String,
        kind: TaskKind,
        error: String,
    },
}

impl ThumbnailEvent {
    pub fn url(&self) -> &str {
        match self {
            ThumbnailEvent::Completed { url, .. }
            | ThumbnailEvent::Failed { url, .. } => url,
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = ThumbnailEvent::Failed {
            url: "https://x/a.png".into(),
            kind: TaskKind::Image,
            error: "boom".into(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "failed");
        assert_eq!(json["kind"], "image");
    }
}

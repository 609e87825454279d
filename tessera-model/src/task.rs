use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Kind of media a cache task materializes.
///
/// The kind selects the cache subdirectory and which field of the owning
/// message body gets patched once the file is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TaskKind {
    Image,
    Video,
    Emoji,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Video => "video",
            TaskKind::Emoji => "emoji",
        }
    }

    /// Name of the cache folder holding files of this kind.
    pub const fn folder(self) -> &'static str {
        match self {
            TaskKind::Emoji => "emojis",
            TaskKind::Image | TaskKind::Video => "thumbnails",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(TaskKind::Image),
            "video" => Ok(TaskKind::Video),
            "emoji" => Ok(TaskKind::Emoji),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TaskStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Pending or downloading work that new callers should join rather than
    /// replace.
    pub const fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Downloading)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Generation number of a task.
///
/// A url can be served by several tasks over the lifetime of a cache (after
/// an invalidation or a terminal failure). Only the task whose id matches
/// the status entry for its url may publish results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Identifies the chat message that owns a cached asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrelationIds {
    pub message_id: String,
    pub room_id: String,
}

impl CorrelationIds {
    pub fn new(
        message_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            room_id: room_id.into(),
        }
    }
}

/// One unit of cache work, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    pub kind: TaskKind,
    pub correlation: CorrelationIds,
    pub status: TaskStatus,
    pub retries: u32,
    /// Absolute local path, set once the task is `Completed`.
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        id: TaskId,
        url: String,
        kind: TaskKind,
        correlation: CorrelationIds,
    ) -> Self {
        Self {
            id,
            url,
            kind,
            correlation,
            status: TaskStatus::Pending,
            retries: 0,
            path: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_and_media_use_distinct_folders() {
        assert_eq!(TaskKind::Emoji.folder(), "emojis");
        assert_eq!(TaskKind::Image.folder(), "thumbnails");
        assert_eq!(TaskKind::Video.folder(), "thumbnails");
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Emoji".parse::<TaskKind>(), Ok(TaskKind::Emoji));
        assert_eq!(" video ".parse::<TaskKind>(), Ok(TaskKind::Video));
        assert!("gif".parse::<TaskKind>().is_err());
    }

    #[test]
    fn new_task_starts_pending_without_retries() {
        let task = Task::new(
            TaskId(7),
            "https://x/a.png".into(),
            TaskKind::Image,
            CorrelationIds::new("m1", "r1"),
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retries, 0);
        assert!(task.path.is_none());
        assert!(task.status.is_in_flight());
        assert!(!task.status.is_terminal());
    }
}

//! Message-store port.
//!
//! After a successful cache fill the engine patches the owning chat message
//! so later renders can use the local file. Stores are best-effort
//! collaborators: a failed patch never undoes the cached file.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tessera_model::MessagePatch;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MessageStoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to persist message {message_id}: {reason}")]
    Persist { message_id: String, reason: String },
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn patch_media_path(
        &self,
        patch: &MessagePatch,
    ) -> Result<(), MessageStoreError>;
}

/// Store used when no message persistence is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMessageStore;

#[async_trait]
impl MessageStore for NoopMessageStore {
    async fn patch_media_path(
        &self,
        _patch: &MessagePatch,
    ) -> Result<(), MessageStoreError> {
        Ok(())
    }
}

/// Write the patched local path into a JSON message body.
///
/// Existing keys are preserved; a non-object body is replaced by an object.
pub fn apply_patch_to_body(body: &mut Value, patch: &MessagePatch) {
    if !body.is_object() {
        *body = Value::Object(Map::new());
    }
    if let Value::Object(map) = body {
        map.insert(
            patch.field().key().to_string(),
            Value::String(patch.path.to_string_lossy().into_owned()),
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub room_id: String,
    pub body: Value,
}

/// In-memory message bodies keyed by message id.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<HashMap<String, StoredMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        message_id: impl Into<String>,
        room_id: impl Into<String>,
        body: Value,
    ) {
        self.messages.lock().insert(
            message_id.into(),
            StoredMessage {
                room_id: room_id.into(),
                body,
            },
        );
    }

    pub fn get(&self, message_id: &str) -> Option<StoredMessage> {
        self.messages.lock().get(message_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn patch_media_path(
        &self,
        patch: &MessagePatch,
    ) -> Result<(), MessageStoreError> {
        let mut messages = self.messages.lock();
        let Some(message) = messages.get_mut(&patch.message_id) else {
            debug!(
                message_id = %patch.message_id,
                "message not loaded; skipping media path patch"
            );
            return Ok(());
        };
        apply_patch_to_body(&mut message.body, patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_model::{CorrelationIds, TaskKind};

    fn patch(kind: TaskKind) -> MessagePatch {
        MessagePatch::new(
            &CorrelationIds::new("m1", "r1"),
            kind,
            "/cache/a.png".into(),
        )
    }

    #[test]
    fn patch_preserves_existing_body_fields() {
        let mut body = json!({ "url": "https://x/a.png", "width": 10 });
        apply_patch_to_body(&mut body, &patch(TaskKind::Image));
        assert_eq!(body["thumbnailPath"], "/cache/a.png");
        assert_eq!(body["url"], "https://x/a.png");
        assert_eq!(body["width"], 10);
    }

    #[test]
    fn non_object_body_becomes_object() {
        let mut body = Value::Null;
        apply_patch_to_body(&mut body, &patch(TaskKind::Emoji));
        assert_eq!(body, json!({ "localPath": "/cache/a.png" }));
    }

    #[tokio::test]
    async fn in_memory_store_patches_known_messages_only() {
        let store = InMemoryMessageStore::new();
        store.insert("m1", "r1", json!({}));

        store
            .patch_media_path(&patch(TaskKind::Video))
            .await
            .expect("patch");
        let stored = store.get("m1").expect("message");
        assert_eq!(stored.body["thumbnailPath"], "/cache/a.png");

        let unknown = MessagePatch::new(
            &CorrelationIds::new("missing", "r1"),
            TaskKind::Image,
            "/cache/b.png".into(),
        );
        store.patch_media_path(&unknown).await.expect("skip");
        assert_eq!(store.len(), 1);
    }
}

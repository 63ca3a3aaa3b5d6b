//! Per-chat session memory for the latest OCR result.
//!
//! Handlers never touch the map directly; they ask the store for the
//! [`Session`] of their own chat and read or write through that.

use crate::normalize::NormalizedResult;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory store of every chat's latest result. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<i64, NormalizedResult>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session context for one chat.
    pub fn session(&self, chat_id: i64) -> Session {
        Session {
            chat_id,
            store: self.clone(),
        }
    }
}

/// Scoped view of the store for a single chat.
#[derive(Debug, Clone)]
pub struct Session {
    chat_id: i64,
    store: SessionStore,
}

impl Session {
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Replace whatever this chat had with a new result.
    pub fn remember(&self, result: NormalizedResult) {
        let mut results = self.store.inner.write().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(
            "Session {}: stored result ({} text chars, {} markdown chars)",
            self.chat_id,
            result.plain_text.chars().count(),
            result.markdown.chars().count()
        );
        results.insert(self.chat_id, result);
    }

    /// The latest result, which stays available for further downloads.
    pub fn latest(&self) -> Option<NormalizedResult> {
        let results = self.store.inner.read().unwrap_or_else(|e| e.into_inner());
        results.get(&self.chat_id).cloned()
    }
}

//! Persistent session storage
//!
//! The client persists the access token, refresh token and normalized user
//! record, each independently clearable, plus an optional recovery cache of
//! in-progress answers keyed by quiz id. The store is single-writer from the
//! application's perspective; [`FileStore`] writes atomically (temp file +
//! rename) so a crash mid-write never leaves a torn document behind.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::User;

/// Selected option ids per question id. `BTreeSet` keeps submission payloads
/// deterministic regardless of selection order.
pub type AnswerMap = HashMap<String, BTreeSet<String>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored document is not valid JSON: {0}")]
    Corrupt(String),
}

/// Persisted session state.
pub trait SessionStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn access_token(&self) -> Result<Option<String>, StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn set_access_token(&self, token: &str) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn refresh_token(&self) -> Result<Option<String>, StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn set_refresh_token(&self, token: &str) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn clear_access_token(&self) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn clear_refresh_token(&self) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn user(&self) -> Result<Option<User>, StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn set_user(&self, user: &User) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn clear_user(&self) -> Result<(), StoreError>;

    /// Store both tokens together.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        self.set_access_token(access_token)?;
        self.set_refresh_token(refresh_token)
    }

    /// Remove tokens and the user record. The answer cache is left intact.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn clear(&self) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn cached_answers(&self, quiz_id: &str) -> Result<Option<AnswerMap>, StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn cache_answers(&self, quiz_id: &str, answers: &AnswerMap) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn clear_cached_answers(&self, quiz_id: &str) -> Result<(), StoreError>;
}

/// Everything the client persists, stored as one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<User>,
    #[serde(default)]
    cached_answers: HashMap<String, AnswerMap>,
}

impl StoreDocument {
    fn clear_session(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.user = None;
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// JSON-file-backed store. Each mutation is a read-modify-write under a lock,
/// flushed atomically.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<StoreDocument, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(doc).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = temp_path(&self.path);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let doc = self.load()?;
        Ok(f(&doc))
    }

    fn update(&self, f: impl FnOnce(&mut StoreDocument)) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut doc = self.load()?;
        f(&mut doc);
        self.save(&doc)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

impl SessionStore for FileStore {
    fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.read(|doc| doc.access_token.clone())
    }

    fn set_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.update(|doc| doc.access_token = Some(token.to_string()))
    }

    fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.read(|doc| doc.refresh_token.clone())
    }

    fn set_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.update(|doc| doc.refresh_token = Some(token.to_string()))
    }

    fn clear_access_token(&self) -> Result<(), StoreError> {
        self.update(|doc| doc.access_token = None)
    }

    fn clear_refresh_token(&self) -> Result<(), StoreError> {
        self.update(|doc| doc.refresh_token = None)
    }

    fn user(&self) -> Result<Option<User>, StoreError> {
        self.read(|doc| doc.user.clone())
    }

    fn set_user(&self, user: &User) -> Result<(), StoreError> {
        self.update(|doc| doc.user = Some(user.clone()))
    }

    fn clear_user(&self) -> Result<(), StoreError> {
        self.update(|doc| doc.user = None)
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.access_token = Some(access_token.to_string());
            doc.refresh_token = Some(refresh_token.to_string());
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.update(StoreDocument::clear_session)
    }

    fn cached_answers(&self, quiz_id: &str) -> Result<Option<AnswerMap>, StoreError> {
        self.read(|doc| doc.cached_answers.get(quiz_id).cloned())
    }

    fn cache_answers(&self, quiz_id: &str, answers: &AnswerMap) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.cached_answers
                .insert(quiz_id.to_string(), answers.clone());
        })
    }

    fn clear_cached_answers(&self, quiz_id: &str) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.cached_answers.remove(quiz_id);
        })
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Ephemeral store for tests and non-persistent sessions.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn doc(&self) -> std::sync::MutexGuard<'_, StoreDocument> {
        self.doc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.doc().access_token.clone())
    }

    fn set_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.doc().access_token = Some(token.to_string());
        Ok(())
    }

    fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.doc().refresh_token.clone())
    }

    fn set_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.doc().refresh_token = Some(token.to_string());
        Ok(())
    }

    fn clear_access_token(&self) -> Result<(), StoreError> {
        self.doc().access_token = None;
        Ok(())
    }

    fn clear_refresh_token(&self) -> Result<(), StoreError> {
        self.doc().refresh_token = None;
        Ok(())
    }

    fn user(&self) -> Result<Option<User>, StoreError> {
        Ok(self.doc().user.clone())
    }

    fn set_user(&self, user: &User) -> Result<(), StoreError> {
        self.doc().user = Some(user.clone());
        Ok(())
    }

    fn clear_user(&self) -> Result<(), StoreError> {
        self.doc().user = None;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.doc().clear_session();
        Ok(())
    }

    fn cached_answers(&self, quiz_id: &str) -> Result<Option<AnswerMap>, StoreError> {
        Ok(self.doc().cached_answers.get(quiz_id).cloned())
    }

    fn cache_answers(&self, quiz_id: &str, answers: &AnswerMap) -> Result<(), StoreError> {
        self.doc()
            .cached_answers
            .insert(quiz_id.to_string(), answers.clone());
        Ok(())
    }

    fn clear_cached_answers(&self, quiz_id: &str) -> Result<(), StoreError> {
        self.doc().cached_answers.remove(quiz_id);
        Ok(())
    }
}

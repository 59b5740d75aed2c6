//! Identity: per-session visitor id and cursor color.
//!
//! DESIGN
//! ======
//! Identity is read from session-scoped storage under well-known keys and
//! generated on first use. Storage is a trait so the host can plug in
//! whatever "session" means for it (a browser tab, a CLI session file).
//!
//! ERROR HANDLING
//! ==============
//! If storage fails, a fresh identity is generated and held in memory for
//! the lifetime of the `Identity` value. The feature keeps working; the id
//! just does not survive a reload.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::StorageError;

/// Session storage key for the visitor id.
pub const VISITOR_ID_KEY: &str = "visitor-id";

/// Session storage key for the cursor color.
pub const VISITOR_COLOR_KEY: &str = "visitor-color";

/// Fixed cursor palette. One entry is picked per session.
pub const PALETTE: [&str; 8] = [
    "#22c55e", "#3b82f6", "#f59e0b", "#ef4444", "#a855f7", "#06b6d4", "#ec4899", "#84cc16",
];

// =============================================================================
// STORAGE
// =============================================================================

/// Session-scoped key/value storage.
pub trait SessionStorage: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Process-local storage. Lives as long as the value does.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON object on disk, one file per session.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The local visitor's identity for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub visitor_id: String,
    pub color: String,
}

impl Identity {
    /// Load or create both halves of the identity.
    pub fn load(storage: &dyn SessionStorage) -> Self {
        Self { visitor_id: get_or_create_visitor_id(storage), color: get_or_create_color(storage) }
    }
}

/// Read the visitor id from storage, generating and persisting one if absent.
pub fn get_or_create_visitor_id(storage: &dyn SessionStorage) -> String {
    get_or_create(storage, VISITOR_ID_KEY, |v| !v.trim().is_empty(), generate_visitor_id)
}

/// Read the cursor color from storage, picking and persisting one if absent.
pub fn get_or_create_color(storage: &dyn SessionStorage) -> String {
    get_or_create(storage, VISITOR_COLOR_KEY, |v| PALETTE.contains(&v), pick_color)
}

fn get_or_create(
    storage: &dyn SessionStorage,
    key: &str,
    is_valid: impl Fn(&str) -> bool,
    generate: impl Fn() -> String,
) -> String {
    match storage.get(key) {
        Ok(Some(existing)) if is_valid(&existing) => return existing,
        Ok(_) => {}
        Err(e) => {
            let fresh = generate();
            warn!(key, error = %e, "identity: storage unavailable, using in-memory value");
            return fresh;
        }
    }

    let fresh = generate();
    if let Err(e) = storage.set(key, &fresh) {
        warn!(key, error = %e, "identity: failed to persist, value will not survive reload");
    } else {
        debug!(key, value = %fresh, "identity: created");
    }
    fresh
}

/// Generate a pseudo-random visitor id, e.g. `v-3f9a0c1d2e4b`.
#[must_use]
pub fn generate_visitor_id() -> String {
    let bytes: [u8; 6] = rand::rng().random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("v-{hex}")
}

fn pick_color() -> String {
    let index = rand::rng().random_range(0..PALETTE.len());
    PALETTE[index].to_string()
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;

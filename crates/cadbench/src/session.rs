//! Live-edit session cache.
//!
//! Each workbench instance persists three strings under its namespace:
//! the code being edited, the last source that built successfully, and the
//! hash of the template the session started from. When the template
//! changes, the stored sources no longer apply and are dropped.

use crate::store::{KeyValueStore, StoreError};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Lowercase hex SHA-256 of a template.
pub fn template_hash(template: &str) -> String {
    format!("{:x}", Sha256::digest(template.as_bytes()))
}

/// Store key of `field` (`code`, `last-good` or `orig-hash`) for a session.
pub fn session_key(namespace: &str, instance: &str, field: &str) -> String {
    format!("{namespace}:{instance}:{field}")
}

/// Persisted editing state of one workbench instance.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    instance: String,
    prefix: String,
    template: String,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    /// Open the session `{namespace}:{instance}` for `template`.
    ///
    /// If the stored template hash differs from `template`'s, the stored
    /// code and last-good source are cleared before the new hash is saved.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        namespace: &str,
        instance: &str,
        template: &str,
    ) -> Result<Self, StoreError> {
        let session = Self {
            store,
            namespace: namespace.to_string(),
            instance: instance.to_string(),
            prefix: format!("{namespace}:{instance}"),
            template: template.to_string(),
        };
        let hash = template_hash(template);
        let stored = session.store.get(&session.key("orig-hash"))?;
        if stored.as_deref() != Some(hash.as_str()) {
            if stored.is_some() {
                tracing::info!(session = %session.prefix, "template changed, discarding stored sources");
            }
            session.store.remove(&session.key("code"))?;
            session.store.remove(&session.key("last-good"))?;
            session.store.set(&session.key("orig-hash"), &hash)?;
        }
        Ok(session)
    }

    fn key(&self, field: &str) -> String {
        session_key(&self.namespace, &self.instance, field)
    }

    fn read(&self, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(&self.key(field))?.filter(|s| !s.is_empty()))
    }

    /// `{namespace}:{instance}`.
    pub fn id(&self) -> &str {
        &self.prefix
    }

    /// The template this session was opened with.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Persisted code, if any.
    pub fn code(&self) -> Result<Option<String>, StoreError> {
        self.read("code")
    }

    /// Last source that built successfully, if any.
    pub fn last_good(&self) -> Result<Option<String>, StoreError> {
        self.read("last-good")
    }

    /// Stored template hash.
    pub fn origin_hash(&self) -> Result<Option<String>, StoreError> {
        self.read("orig-hash")
    }

    /// The source to run: `live` if non-empty, else last-good, else the
    /// persisted code, else the template.
    pub fn resolve_source(&self, live: Option<&str>) -> Result<String, StoreError> {
        if let Some(live) = live.filter(|s| !s.is_empty()) {
            return Ok(live.to_string());
        }
        if let Some(source) = self.last_good()? {
            return Ok(source);
        }
        if let Some(source) = self.code()? {
            return Ok(source);
        }
        Ok(self.template.clone())
    }

    /// Persist the code being edited.
    pub fn write_code(&self, text: &str) -> Result<(), StoreError> {
        self.store.set(&self.key("code"), text)
    }

    /// Remember `text` as the last source that built. Call only after a
    /// confirmed successful run.
    pub fn write_last_good(&self, text: &str) -> Result<(), StoreError> {
        self.store.set(&self.key("last-good"), text)
    }

    /// Drop the stored sources so the template applies again.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.remove(&self.key("code"))?;
        self.store.remove(&self.key("last-good"))?;
        tracing::info!(session = %self.prefix, "session reset to template");
        Ok(())
    }
}

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Submission storage semantics - defines only the key scheme and the
/// read/write/delete contract, so every front end persists the same way.
///
/// Values are JSON-encoded strings; `solved-*` holds a JSON boolean.

pub const CODE_PREFIX: &str = "code";
pub const HTML_PREFIX: &str = "code-html";
pub const CSS_PREFIX: &str = "code-css";
pub const SOLVED_PREFIX: &str = "solved";

/// Key holding the learner's JavaScript for a problem
pub fn code_key(problem_id: &str) -> String {
    format!("{}-{}", CODE_PREFIX, problem_id)
}

/// Key holding the learner's HTML for a markup problem
pub fn html_key(problem_id: &str) -> String {
    format!("{}-{}", HTML_PREFIX, problem_id)
}

/// Key holding the learner's CSS for a markup problem
pub fn css_key(problem_id: &str) -> String {
    format!("{}-{}", CSS_PREFIX, problem_id)
}

/// Key of the solved flag, keyed by slug rather than id
pub fn solved_key(slug: &str) -> String {
    format!("{}-{}", SOLVED_PREFIX, slug)
}

/// Client-local key/value storage
pub trait SubmissionStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubmissionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
///
/// The whole file is rewritten on every mutation; it only ever holds a
/// handful of submissions.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory {}", parent.display()))?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store {}", self.path.display()))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries).context("Failed to serialize store")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write store {}", self.path.display()))
    }
}

impl SubmissionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("file store lock poisoned"))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("file store lock poisoned"))?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("file store lock poisoned"))?;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_key_format() {
        assert_eq!(code_key("sum"), "code-sum");
        assert_eq!(html_key("navbar"), "code-html-navbar");
        assert_eq!(css_key("navbar"), "code-css-navbar");
        assert_eq!(solved_key("centerdiv"), "solved-centerdiv");
    }

    #[test]
    fn test_key_deterministic() {
        assert_eq!(code_key("iseven"), code_key("iseven"));
        assert_ne!(code_key("iseven"), solved_key("iseven"));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("code-sum", "\"function add(a, b){}\"").unwrap();
        assert_eq!(store.get("code-sum").unwrap().as_deref(), Some("\"function add(a, b){}\""));

        store.remove("code-sum").unwrap();
        assert_eq!(store.get("code-sum").unwrap(), None);
        // removing twice is fine
        store.remove("code-sum").unwrap();
    }

    #[test]
    fn test_file_store_persists_across_handles() {
        let path = std::env::temp_dir().join(format!("kata-store-{}.json", Uuid::new_v4()));

        {
            let store = FileStore::open(&path).unwrap();
            store.set("solved-sum", "true").unwrap();
            store.set("code-sum", "\"x\"").unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("solved-sum").unwrap().as_deref(), Some("true"));

        reopened.remove("solved-sum").unwrap();
        assert_eq!(reopened.get("solved-sum").unwrap(), None);
        assert_eq!(reopened.get("code-sum").unwrap().as_deref(), Some("\"x\""));

        fs::remove_file(&path).ok();
    }
}

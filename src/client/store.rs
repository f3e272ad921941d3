//! Durable key/value storage for the two client entries (mission and story).
//!
//! `FileStore` keeps one JSON file per key in a directory, the desktop
//! counterpart of browser local storage. `MemoryStore` is process-local.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::debug;

pub const MISSION_KEY: &str = "storyengine_teacher_mission_v1";
pub const STORY_KEY: &str = "storyengine_story_state_v1";

pub trait StateStore: Send + Sync {
    /// Raw stored text, or `None` when nothing (readable) is stored.
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for FileStore {
    fn load(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        std::fs::write(&path, value)?;
        debug!(target: "storyengine", path = %path.display(), bytes = value.len(), "Saved client state");
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        assert_eq!(store.load(MISSION_KEY), None);
        store.save(MISSION_KEY, r#"{"topic":"Bees"}"#).unwrap();
        assert_eq!(store.load(MISSION_KEY).as_deref(), Some(r#"{"topic":"Bees"}"#));
        assert!(store.dir().join(format!("{MISSION_KEY}.json")).exists());

        store.remove(MISSION_KEY).unwrap();
        assert_eq!(store.load(MISSION_KEY), None);
        // Removing twice is fine.
        store.remove(MISSION_KEY).unwrap();
    }

    #[test]
    fn memory_store_keeps_keys_apart() {
        let store = MemoryStore::new();
        store.save(MISSION_KEY, "m").unwrap();
        store.save(STORY_KEY, "s").unwrap();
        store.remove(STORY_KEY).unwrap();
        assert_eq!(store.load(MISSION_KEY).as_deref(), Some("m"));
        assert_eq!(store.load(STORY_KEY), None);
    }
}

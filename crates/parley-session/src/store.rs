//! Persisted presence lists: online users, known topics, and
//! `username:topic` mappings.
//!
//! These lists are a side effect of login, logout, subscribe, and
//! unsubscribe. Routing never reads them; the
//! [`SessionRegistry`](crate::SessionRegistry) is the only source of truth. Every update is an
//! upsert-or-prune of one entry followed by a full rewrite of the affected
//! list.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::StoreError;

/// File holding one online username per line.
pub const ONLINE_FILE: &str = "online.txt";
/// File holding one topic name per line.
pub const TOPICS_FILE: &str = "topics.txt";
/// File holding one `username:topic` mapping per line.
pub const USER_TOPICS_FILE: &str = "user_topics.txt";

/// Storage for the three presence lists.
///
/// Appends are idempotent: adding an entry that is already present leaves
/// the list unchanged.
pub trait PresenceStore: Send + 'static {
    /// Empties every list.
    fn reset(&mut self) -> Result<(), StoreError>;

    fn add_online(&mut self, username: &str) -> Result<(), StoreError>;
    fn remove_online(&mut self, username: &str) -> Result<(), StoreError>;
    fn online(&self) -> Result<Vec<String>, StoreError>;

    /// Remembers a topic name. Topics are never removed.
    fn add_topic(&mut self, topic: &str) -> Result<(), StoreError>;
    fn topics(&self) -> Result<Vec<String>, StoreError>;

    fn add_subscription(&mut self, username: &str, topic: &str) -> Result<(), StoreError>;
    fn remove_subscription(&mut self, username: &str, topic: &str) -> Result<(), StoreError>;
    fn remove_all_for_user(&mut self, username: &str) -> Result<(), StoreError>;
    fn subscriptions(&self) -> Result<Vec<(String, String)>, StoreError>;
}

// ---------------------------------------------------------------------------
// List helpers
// ---------------------------------------------------------------------------

fn mapping(username: &str, topic: &str) -> String {
    format!("{username}:{topic}")
}

fn parse_mapping(line: &str) -> Option<(String, String)> {
    line.split_once(':')
        .map(|(user, topic)| (user.to_string(), topic.to_string()))
}

/// Appends `entry` unless present. Returns `true` if the list changed.
fn upsert(lines: &mut Vec<String>, entry: &str) -> bool {
    if lines.iter().any(|l| l == entry) {
        return false;
    }
    lines.push(entry.to_string());
    true
}

/// Removes every line matching `doomed`. Returns `true` if the list changed.
fn prune(lines: &mut Vec<String>, doomed: impl Fn(&str) -> bool) -> bool {
    let before = lines.len();
    lines.retain(|l| !doomed(l.as_str()));
    lines.len() != before
}

fn owned_by(username: &str) -> impl Fn(&str) -> bool + '_ {
    move |line: &str| {
        line.strip_prefix(username)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Lists {
    online: Vec<String>,
    topics: Vec<String>,
    mappings: Vec<String>,
}

/// In-memory lists. Clones share the same lists, so a test can keep one
/// handle while the registry owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    lists: Arc<Mutex<Lists>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lists(&self) -> MutexGuard<'_, Lists> {
        // A poisoned lock only means another test thread panicked.
        self.lists.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PresenceStore for MemoryStore {
    fn reset(&mut self) -> Result<(), StoreError> {
        *self.lists() = Lists::default();
        Ok(())
    }

    fn add_online(&mut self, username: &str) -> Result<(), StoreError> {
        upsert(&mut self.lists().online, username);
        Ok(())
    }

    fn remove_online(&mut self, username: &str) -> Result<(), StoreError> {
        prune(&mut self.lists().online, |l| l == username);
        Ok(())
    }

    fn online(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lists().online.clone())
    }

    fn add_topic(&mut self, topic: &str) -> Result<(), StoreError> {
        upsert(&mut self.lists().topics, topic);
        Ok(())
    }

    fn topics(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lists().topics.clone())
    }

    fn add_subscription(&mut self, username: &str, topic: &str) -> Result<(), StoreError> {
        upsert(&mut self.lists().mappings, &mapping(username, topic));
        Ok(())
    }

    fn remove_subscription(&mut self, username: &str, topic: &str) -> Result<(), StoreError> {
        let entry = mapping(username, topic);
        prune(&mut self.lists().mappings, |l| l == entry);
        Ok(())
    }

    fn remove_all_for_user(&mut self, username: &str) -> Result<(), StoreError> {
        prune(&mut self.lists().mappings, owned_by(username));
        Ok(())
    }

    fn subscriptions(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .lists()
            .mappings
            .iter()
            .filter_map(|l| parse_mapping(l))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FlatFileStore
// ---------------------------------------------------------------------------

/// Line-oriented text files in one directory, rewritten whole on every
/// change.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    dir: PathBuf,
}

impl FlatFileStore {
    /// Uses `dir` for the three list files, creating it if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self, file: &str) -> Result<Vec<String>, StoreError> {
        match fs::read_to_string(self.dir.join(file)) {
            Ok(text) => Ok(text
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &str, lines: &[String]) -> Result<(), StoreError> {
        let mut text = String::new();
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
        fs::write(self.dir.join(file), text)?;
        Ok(())
    }

    /// Reads a list, applies `edit`, and rewrites it if anything changed.
    fn update(
        &self,
        file: &str,
        edit: impl FnOnce(&mut Vec<String>) -> bool,
    ) -> Result<(), StoreError> {
        let mut lines = self.read(file)?;
        if edit(&mut lines) {
            self.write(file, &lines)?;
        }
        Ok(())
    }
}

impl PresenceStore for FlatFileStore {
    fn reset(&mut self) -> Result<(), StoreError> {
        for file in [ONLINE_FILE, TOPICS_FILE, USER_TOPICS_FILE] {
            self.write(file, &[])?;
        }
        Ok(())
    }

    fn add_online(&mut self, username: &str) -> Result<(), StoreError> {
        self.update(ONLINE_FILE, |lines| upsert(lines, username))
    }

    fn remove_online(&mut self, username: &str) -> Result<(), StoreError> {
        self.update(ONLINE_FILE, |lines| prune(lines, |l| l == username))
    }

    fn online(&self) -> Result<Vec<String>, StoreError> {
        self.read(ONLINE_FILE)
    }

    fn add_topic(&mut self, topic: &str) -> Result<(), StoreError> {
        self.update(TOPICS_FILE, |lines| upsert(lines, topic))
    }

    fn topics(&self) -> Result<Vec<String>, StoreError> {
        self.read(TOPICS_FILE)
    }

    fn add_subscription(&mut self, username: &str, topic: &str) -> Result<(), StoreError> {
        let entry = mapping(username, topic);
        self.update(USER_TOPICS_FILE, |lines| upsert(lines, &entry))
    }

    fn remove_subscription(&mut self, username: &str, topic: &str) -> Result<(), StoreError> {
        let entry = mapping(username, topic);
        self.update(USER_TOPICS_FILE, |lines| prune(lines, |l| l == entry))
    }

    fn remove_all_for_user(&mut self, username: &str) -> Result<(), StoreError> {
        self.update(USER_TOPICS_FILE, |lines| prune(lines, owned_by(username)))
    }

    fn subscriptions(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .read(USER_TOPICS_FILE)?
            .iter()
            .filter_map(|l| parse_mapping(l))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(user: &str, topic: &str) -> (String, String) {
        (user.to_string(), topic.to_string())
    }

    #[test]
    fn test_owned_by_matches_exact_user_prefix() {
        let owned = owned_by("al");
        assert!(owned("al:news"));
        assert!(!owned("alice:news"));
        assert!(!owned("bob:al"));
    }

    #[test]
    fn test_memory_store_upserts_are_idempotent() {
        let mut store = MemoryStore::new();
        store.add_online("alice").unwrap();
        store.add_online("alice").unwrap();
        store.add_subscription("alice", "news").unwrap();
        store.add_subscription("alice", "news").unwrap();
        assert_eq!(store.online().unwrap(), vec!["alice"]);
        assert_eq!(store.subscriptions().unwrap(), vec![pair("alice", "news")]);
    }

    #[test]
    fn test_memory_store_clones_share_lists() {
        let observer = MemoryStore::new();
        let mut writer = observer.clone();
        writer.add_topic("news").unwrap();
        assert_eq!(observer.topics().unwrap(), vec!["news"]);
    }

    #[test]
    fn test_memory_store_remove_all_for_user() {
        let mut store = MemoryStore::new();
        store.add_subscription("alice", "news").unwrap();
        store.add_subscription("alice", "sport").unwrap();
        store.add_subscription("bob", "news").unwrap();
        store.remove_all_for_user("alice").unwrap();
        assert_eq!(store.subscriptions().unwrap(), vec![pair("bob", "news")]);
    }

    #[test]
    fn test_flat_file_store_persists_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FlatFileStore::new(dir.path()).expect("store");

        store.add_online("alice").unwrap();
        store.add_online("bob").unwrap();
        store.add_topic("news").unwrap();
        store.add_topic("news").unwrap();
        store.add_subscription("alice", "news").unwrap();

        let online = fs::read_to_string(dir.path().join(ONLINE_FILE)).unwrap();
        assert_eq!(online, "alice\nbob\n");
        let topics = fs::read_to_string(dir.path().join(TOPICS_FILE)).unwrap();
        assert_eq!(topics, "news\n");
        let mappings =
            fs::read_to_string(dir.path().join(USER_TOPICS_FILE)).unwrap();
        assert_eq!(mappings, "alice:news\n");
    }

    #[test]
    fn test_flat_file_store_prunes_and_rewrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FlatFileStore::new(dir.path()).expect("store");

        store.add_online("alice").unwrap();
        store.add_online("bob").unwrap();
        store.remove_online("alice").unwrap();
        store.add_subscription("bob", "a").unwrap();
        store.add_subscription("bob", "b").unwrap();
        store.remove_subscription("bob", "a").unwrap();

        assert_eq!(store.online().unwrap(), vec!["bob"]);
        assert_eq!(store.subscriptions().unwrap(), vec![pair("bob", "b")]);
    }

    #[test]
    fn test_flat_file_store_reset_truncates_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FlatFileStore::new(dir.path()).expect("store");
        store.add_online("alice").unwrap();
        store.add_topic("news").unwrap();

        store.reset().unwrap();

        assert!(store.online().unwrap().is_empty());
        assert!(store.topics().unwrap().is_empty());
        assert!(store.subscriptions().unwrap().is_empty());
    }

    #[test]
    fn test_flat_file_store_missing_files_read_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FlatFileStore::new(dir.path().join("nested")).expect("store");
        assert!(store.online().unwrap().is_empty());
    }
}

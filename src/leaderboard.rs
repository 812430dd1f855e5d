//! Top scores per category, kept in a small key-value store so they survive
//! restarts of the bot.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Key the whole leaderboard is stored under.
pub const LEADERBOARD_KEY: &str = "trivia.leaderboard";

/// How many entries each category keeps.
pub const TOP_SCORES: usize = 5;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("leaderboard storage is unavailable: {0}")]
    Unavailable(#[from] io::Error),

    #[error("leaderboard data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u32,
}

impl LeaderboardEntry {
    pub fn new(name: impl Into<String>, score: u32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Category key to its best entries, highest score first.
pub type Board = BTreeMap<String, Vec<LeaderboardEntry>>;

/// Durable string storage addressed by key.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> io::Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        // Write next to the target and rename so readers never see half a file
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path(key))
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

pub struct Leaderboard {
    store: Box<dyn KeyValueStore>,
    // Held across the whole read-modify-write of `record` and `clear`
    write_lock: Mutex<()>,
}

impl Leaderboard {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::default())
    }

    /// Adds `entry` to the category's list and keeps the best five.
    /// Returns the category's list as stored.
    pub fn record(
        &self,
        category: &str,
        entry: LeaderboardEntry,
    ) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut board = match self.load() {
            Ok(board) => board,
            Err(StorageError::Corrupt(err)) => {
                log::warn!("Discarding corrupt leaderboard: {}", err);
                Board::new()
            }
            Err(err) => return Err(err),
        };

        let entries = board.entry(category.to_string()).or_default();
        entries.push(entry);
        // Stable, so equal scores keep their arrival order
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(TOP_SCORES);
        let top = entries.clone();

        self.store
            .save(LEADERBOARD_KEY, &serde_json::to_string(&board)?)?;
        log::debug!("Recorded score in category {}", category);
        Ok(top)
    }

    /// The category's entries, best first. Empty when nothing is stored or
    /// the storage can't be read.
    pub fn get(&self, category: &str) -> Vec<LeaderboardEntry> {
        match self.load() {
            Ok(mut board) => board.remove(category).unwrap_or_default(),
            Err(err) => {
                log::warn!("Leaderboard unavailable: {}", err);
                Vec::new()
            }
        }
    }

    /// Erases every category.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.remove(LEADERBOARD_KEY)?;
        log::info!("Leaderboard cleared");
        Ok(())
    }

    fn load(&self) -> Result<Board, StorageError> {
        match self.store.load(LEADERBOARD_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Board::new()),
        }
    }
}

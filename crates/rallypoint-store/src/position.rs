//! Last known device position, kept as the fallback for failed location fixes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rallypoint_core::Position;

use crate::StoreError;
use crate::json_file::{read_json, write_json};

pub trait PositionCache: Send + Sync {
    fn load(&self) -> Result<Option<Position>, StoreError>;
    fn save(&self, position: &Position) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryPositionCache {
    slot: Mutex<Option<Position>>,
}

impl MemoryPositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(position: Position) -> Self {
        Self {
            slot: Mutex::new(Some(position)),
        }
    }
}

impl PositionCache for MemoryPositionCache {
    fn load(&self) -> Result<Option<Position>, StoreError> {
        Ok(*self.slot.lock().map_err(|_| StoreError::Poisoned)?)
    }

    fn save(&self, position: &Position) -> Result<(), StoreError> {
        *self.slot.lock().map_err(|_| StoreError::Poisoned)? = Some(*position);
        Ok(())
    }
}

/// Position cache stored as a single JSON file.
#[derive(Debug)]
pub struct FilePositionCache {
    path: PathBuf,
}

impl FilePositionCache {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PositionCache for FilePositionCache {
    fn load(&self) -> Result<Option<Position>, StoreError> {
        let position: Option<Position> = read_json(&self.path)?;
        // A hand-edited file with nonsense coordinates is no fallback at all.
        Ok(position.filter(Position::is_valid))
    }

    fn save(&self, position: &Position) -> Result<(), StoreError> {
        write_json(&self.path, position)
    }
}

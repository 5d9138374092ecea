//! Local persistence: the session key/value store and the fallback position cache.

mod error;
mod json_file;
pub mod position;
pub mod session;

pub use error::StoreError;
pub use position::{FilePositionCache, MemoryPositionCache, PositionCache};
pub use session::{
    FULL_NAME_KEY, FileSessionStore, MemorySessionStore, SESSION_KEYS, SESSION_STARTED_KEY,
    SessionStore, TOKEN_KEY,
};

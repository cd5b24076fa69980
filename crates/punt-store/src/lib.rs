//! Storage layer: a JSON key-value abstraction with in-memory and file-backed stores.

mod ai_config;
mod error;
mod file;
mod kv;
mod records;

pub use ai_config::{AI_CONFIG_KEY, AiConfig, has_ai_config, load_ai_config, save_ai_config};
pub use error::StoreError;
pub use file::FileStore;
pub use kv::{KvStore, MemoryStore, load, save};
pub use records::{
    CODE_LEN, assignment_key, generate_code, load_assignment, load_session, normalize_code,
    open_session, publish_assignment, save_session, session_key,
};

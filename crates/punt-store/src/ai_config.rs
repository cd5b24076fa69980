//! The generation service credentials shared by all assignments.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{KvStore, StoreError, load, save};

pub const AI_CONFIG_KEY: &str = "ai_config";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Save the key and model; both are required.
pub fn save_ai_config<S: KvStore + ?Sized>(
    store: &S,
    api_key: &str,
    model: &str,
    now: DateTime<Utc>,
) -> Result<AiConfig, StoreError> {
    let api_key = api_key.trim();
    let model = model.trim();
    if api_key.is_empty() {
        return Err(StoreError::MissingField("API key"));
    }
    if model.is_empty() {
        return Err(StoreError::MissingField("model"));
    }
    let config = AiConfig {
        api_key: api_key.to_string(),
        model: model.to_string(),
        updated_at: now.to_rfc3339(),
    };
    save(store, AI_CONFIG_KEY, &config)?;
    info!(model, "ai configuration saved");
    Ok(config)
}

pub fn load_ai_config<S: KvStore + ?Sized>(store: &S) -> Result<Option<AiConfig>, StoreError> {
    load(store, AI_CONFIG_KEY)
}

pub fn has_ai_config<S: KvStore + ?Sized>(store: &S) -> Result<bool, StoreError> {
    Ok(load_ai_config(store)?.is_some())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::MemoryStore;

    #[test]
    fn save_and_check() {
        let store = MemoryStore::new();
        assert!(!has_ai_config(&store).unwrap());

        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 30, 0).unwrap();
        let saved = save_ai_config(&store, " sk-or-123 ", "google/gemini-2.0-flash-001", now).unwrap();
        assert_eq!(saved.api_key, "sk-or-123");

        assert!(has_ai_config(&store).unwrap());
        let loaded = load_ai_config(&store).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.updated_at, "2026-01-05T08:30:00+00:00");

        let raw = store.get(AI_CONFIG_KEY).unwrap().unwrap();
        assert_eq!(raw["apiKey"], "sk-or-123");
    }

    #[test]
    fn both_fields_required() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert!(matches!(
            save_ai_config(&store, "", "m", now),
            Err(StoreError::MissingField("API key"))
        ));
        assert!(matches!(
            save_ai_config(&store, "k", "  ", now),
            Err(StoreError::MissingField("model"))
        ));
        assert!(!has_ai_config(&store).unwrap());
    }

    #[test]
    fn debug_hides_key() {
        let config = AiConfig {
            api_key: "sk-secret".into(),
            model: "m".into(),
            updated_at: String::new(),
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}

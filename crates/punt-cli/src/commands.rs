//! Subcommand handlers. Each opens the file store, does one thing, and saves.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use punt_ai::{
    EngineOptions, FeedbackEngine, GenerateRequest, ReportGenerator, export_report,
    suggest_criteria,
};
use punt_core::{AssignmentConfig, FeedbackStatus, Niveau, RemoteError, RubricCatalog};
use punt_gateway::{GatewayConfig, OpenRouterClient};
use punt_store::{
    FileStore, has_ai_config, load_ai_config, open_session, publish_assignment, save_ai_config,
    save_session,
};
use tracing::{info, warn};

use crate::{Decision, GlobalArgs, display};

fn open_store(g: &GlobalArgs) -> Result<FileStore> {
    FileStore::open(&g.store).with_context(|| format!("opening store at {}", g.store.display()))
}

fn timeout(g: &GlobalArgs) -> Duration {
    Duration::from_secs(g.timeout_secs)
}

/// Client from flags/env, falling back to the stored configuration.
fn gateway(g: &GlobalArgs, store: &FileStore) -> Result<OpenRouterClient> {
    let stored = load_ai_config(store).context("reading AI configuration")?;
    let api_key = g
        .api_key
        .clone()
        .or_else(|| stored.as_ref().map(|c| c.api_key.clone()))
        .context("no API key: pass --api-key, set OPENROUTER_API_KEY, or run `punt ai-config set`")?;
    let model = g
        .model
        .clone()
        .or_else(|| stored.map(|c| c.model))
        .context("no model: pass --model, set PUNT_MODEL, or run `punt ai-config set`")?;

    let config = GatewayConfig {
        api_base: g.api_base.clone(),
        timeout: timeout(g),
        ..GatewayConfig::new(api_key, model)
    };
    OpenRouterClient::new(config).context("building HTTP client")
}

/// Stands in for the service when no credentials are available at export time.
struct Offline(String);

#[async_trait]
impl ReportGenerator for Offline {
    async fn generate_report(&self, _request: &GenerateRequest) -> Result<String, RemoteError> {
        Err(RemoteError::Unavailable(self.0.clone()))
    }
}

fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading text from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

pub fn ai_config_set(g: &GlobalArgs, api_key: &str, model: &str) -> Result<()> {
    let store = open_store(g)?;
    let config = save_ai_config(&store, api_key, model, Utc::now())?;
    println!("AI configuration saved (model {})", config.model);
    Ok(())
}

pub fn ai_config_check(g: &GlobalArgs) -> Result<()> {
    let store = open_store(g)?;
    if !has_ai_config(&store)? {
        println!("No AI configuration stored.");
        return Ok(());
    }
    if let Some(config) = load_ai_config(&store)? {
        println!("Configured: model {} (updated {})", config.model, config.updated_at);
    }
    Ok(())
}

pub fn rubric(level: Niveau) -> Result<()> {
    let catalog = RubricCatalog::builtin().context("parsing bundled rubric")?;
    display::print_rubric(&catalog, level);
    Ok(())
}

pub async fn suggest(g: &GlobalArgs, level: Niveau, assignment: &str) -> Result<()> {
    let store = open_store(g)?;
    let client = gateway(g, &store)?;
    let criteria = suggest_criteria(&client, assignment, level)
        .await
        .context("requesting criterion suggestions")?;
    if criteria.is_empty() {
        println!("No usable suggestions returned.");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&criteria)?);
    Ok(())
}

pub fn publish(g: &GlobalArgs, config: &Path, students: usize) -> Result<()> {
    let raw = std::fs::read_to_string(config)
        .with_context(|| format!("reading {}", config.display()))?;
    let assignment: AssignmentConfig =
        serde_json::from_str(&raw).context("parsing assignment configuration")?;
    let store = open_store(g)?;
    let codes = publish_assignment(&store, &assignment, students, &mut rand::thread_rng())?;
    println!("Published for {} student(s) at niveau {}:", codes.len(), assignment.level);
    for code in codes {
        println!("  {code}");
    }
    Ok(())
}

pub async fn feedback(g: &GlobalArgs, code: &str, text: Option<&Path>, pasted: bool) -> Result<()> {
    let store = open_store(g)?;
    let (assignment, mut session) = open_session(&store, code)?;
    if let Some(path) = text {
        let new_text = read_text(path)?;
        session.set_text(new_text.clone())?;
        if pasted {
            session.record_paste(&new_text);
        }
    }

    // Edits and the paste flag are kept even when no client can be built.
    let client = match gateway(g, &store) {
        Ok(client) => client,
        Err(e) => {
            save_session(&store, &session)?;
            return Err(e);
        }
    };
    let mut engine = FeedbackEngine::new(client, assignment, session).with_options(EngineOptions {
        timeout: Some(timeout(g)),
        ..Default::default()
    });

    let outcome = match engine.request_feedback().await {
        Ok(round) => {
            display::print_round(round);
            Ok(())
        }
        Err(e) => Err(e),
    };

    let session = engine.into_session();
    save_session(&store, &session)?;
    display::print_tokens(session.tokens_remaining());
    outcome.context("feedback round failed")
}

pub fn review(g: &GlobalArgs, code: &str, round: u8, item: &str, decision: Decision) -> Result<()> {
    let store = open_store(g)?;
    let (_, mut session) = open_session(&store, code)?;
    let status = match decision {
        Decision::Accept => FeedbackStatus::Accepted,
        Decision::Reject => FeedbackStatus::Rejected,
    };
    session.set_item_status(round, item, status)?;
    save_session(&store, &session)?;
    info!(code = session.code(), round, item, status = status.as_str(), "feedback reviewed");
    println!("Round {round} item {item}: {}", status.as_str());
    Ok(())
}

pub fn status(g: &GlobalArgs, code: &str, json: bool) -> Result<()> {
    let store = open_store(g)?;
    let (assignment, session) = open_session(&store, code)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        display::print_status(&assignment, &session, Utc::now());
    }
    Ok(())
}

pub async fn export(g: &GlobalArgs, code: &str, out: Option<&Path>) -> Result<()> {
    let store = open_store(g)?;
    let (assignment, session) = open_session(&store, code)?;

    let generator: Box<dyn ReportGenerator> = match gateway(g, &store) {
        Ok(client) => Box::new(client),
        Err(e) => {
            warn!(error = %e, "no generation service, exporting without narrative");
            Box::new(Offline(e.to_string()))
        }
    };
    let doc = export_report(generator.as_ref(), &session, &assignment, Some(timeout(g))).await;

    let path = out.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(doc.file_name()));
    std::fs::write(&path, doc.render_html())
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Report written to {}", path.display());
    if doc.narrative.is_fallback() {
        println!("  (narrative unavailable, fallback sentence used)");
    }
    Ok(())
}

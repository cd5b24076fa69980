//! Reflection narrative for the teacher, generated once at export time.
//!
//! The narrative compares the first-feedback version with the final text and
//! reports which feedback was acted upon. Whatever the generator returns is
//! scrubbed of runs copied from the student's texts; when it fails, a fixed
//! fallback sentence is used and the export carries on.

use std::collections::HashSet;
use std::time::Duration;

use punt_core::{
    AssignmentConfig, ChecklistResult, Criterion, FeedbackCategory, FeedbackRound,
    FeedbackStatus, Niveau, RemoteError, SessionState,
};
use tracing::{info, warn};

use crate::generator::{GenerateRequest, ReportGenerator};

pub const NARRATIVE_FALLBACK: &str = "Er is een fout opgetreden bij het genereren van het feedbackrapport. \
De docent kan de ontwikkeling beoordelen op basis van Versie 1 en de Eindversie.";

/// Shortest run of consecutive student words treated as copied text.
pub const VERBATIM_RUN_WORDS: usize = 4;

const REDACTED: &str = "[…]";
const REPORT_TEMPERATURE: f32 = 0.7;
const REPORT_MAX_TOKENS: u32 = 2000;

/// Everything the narrative is built from.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub first_version: Option<&'a str>,
    pub final_text: &'a str,
    pub history: &'a [FeedbackRound],
    pub last_checklist: &'a [ChecklistResult],
    pub assignment_text: &'a str,
    pub criteria: &'a [Criterion],
    pub niveau: Niveau,
}

impl<'a> ReportContext<'a> {
    pub fn from_session(session: &'a SessionState, assignment: &'a AssignmentConfig) -> Self {
        Self {
            first_version: session.first_feedback_version(),
            final_text: session.text(),
            history: session.history(),
            last_checklist: session.last_checklist(),
            assignment_text: &assignment.assignment_text,
            criteria: &assignment.criteria,
            niveau: assignment.level,
        }
    }

    /// Texts the narrative must not quote from.
    fn student_texts(&self) -> Vec<&'a str> {
        let mut texts = vec![self.final_text];
        texts.extend(self.first_version);
        texts.extend(self.history.iter().map(|r| r.text_snapshot.as_str()));
        texts
    }
}

/// What happened to one feedback item by the end of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackUptake {
    pub round: u8,
    pub item_id: String,
    pub sentence_index: usize,
    pub criterion_label: String,
    pub category: FeedbackCategory,
    pub hint: String,
    pub status: FeedbackStatus,
    /// The anchored passage still occurs unchanged in the final text.
    pub passage_retained: bool,
}

impl FeedbackUptake {
    /// Not rejected, and the passage no longer occurs unchanged.
    pub fn acted_upon(&self) -> bool {
        self.status != FeedbackStatus::Rejected && !self.passage_retained
    }
}

pub fn feedback_uptake(ctx: &ReportContext<'_>) -> Vec<FeedbackUptake> {
    ctx.history
        .iter()
        .flat_map(|round| {
            round.feedback_items.iter().map(move |item| FeedbackUptake {
                round: round.round_number,
                item_id: item.id.clone(),
                sentence_index: item.sentence_index,
                criterion_label: item.criterion_label.clone(),
                category: item.category,
                hint: item.hint.clone(),
                status: item.status,
                passage_retained: item
                    .span
                    .slice(&round.text_snapshot)
                    .map(str::trim)
                    .is_some_and(|p| !p.is_empty() && ctx.final_text.contains(p)),
            })
        })
        .collect()
}

/// Build the narrative request.
pub fn compose_report_prompt(ctx: &ReportContext<'_>) -> GenerateRequest {
    GenerateRequest {
        system_prompt: report_system_prompt(ctx.last_checklist),
        user_prompt: report_user_prompt(ctx),
        temperature: REPORT_TEMPERATURE,
        json_output: false,
        max_tokens: Some(REPORT_MAX_TOKENS),
    }
}

fn checklist_summary(checklist: &[ChecklistResult]) -> String {
    if checklist.is_empty() {
        return "Geen checklist beschikbaar".to_string();
    }
    checklist
        .iter()
        .map(|c| {
            let mark = if c.met { "✔" } else { "✘" };
            format!("{mark} {}: {}", c.label, c.explanation)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn report_system_prompt(checklist: &[ChecklistResult]) -> String {
    format!(
        "\
Je bent een beoordelaar voor PUNT!, een schrijfplatform voor taalonderwijs. Je schrijft een feedbackrapport voor de docent.

Het rapport is ZAKELIJK, CONCREET en INFORMATIEF. Geen vage complimenten.

Analyseer:
1. Hoe de leerling met de feedback is omgegaan (welke verwerkt, welke niet).
2. Concrete verbeteringen tussen Versie 1 en de Eindversie.
3. In hoeverre de tekst nu voldoet aan de eisen van de docent (checklist).
4. Welke feedback niet is opgevolgd.

STRUCTUUR (gebruik deze koppen):

**Samenvatting**
2-4 zinnen over de ontwikkeling van Versie 1 naar de Eindversie.

**Gebruik van feedback**
- Noem 2-5 concrete voorbeelden waar feedback WEL is verwerkt.
- Noem welke feedback NIET of nauwelijks is verwerkt.
- Verwijs naar plaatsen in de tekst (bijv. \"in de inleiding\", \"in zin 4\").

**Checklist – docent-eisen**
Geef per eis aan of die behaald is en waarom wel of niet:
{checklist}

**Niet-opgevolgde feedback**
Zakelijke opsomming van feedback die gegeven maar niet verwerkt is.

STIJL:
- Zakelijk Nederlands, gericht aan de docent.
- Geen complimenten zoals \"goed bezig!\".
- Kopieer NOOIT tekst van de leerling; citeer hooguit {max_quote} woorden als verwijzing.",
        checklist = checklist_summary(checklist),
        max_quote = VERBATIM_RUN_WORDS - 1,
    )
}

fn status_nl(status: FeedbackStatus) -> &'static str {
    match status {
        FeedbackStatus::Open => "niet beoordeeld door leerling",
        FeedbackStatus::Accepted => "geaccepteerd",
        FeedbackStatus::Rejected => "afgewezen",
    }
}

fn report_user_prompt(ctx: &ReportContext<'_>) -> String {
    let criteria = ctx
        .criteria
        .iter()
        .filter(|c| c.selected)
        .map(|c| format!("- {}: {}", c.label, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    let uptake = feedback_uptake(ctx);
    let mut rounds = String::new();
    for round in ctx.history {
        rounds.push_str(&format!("\n=== Feedbackronde {} ===\n", round.round_number));
        let items: Vec<&FeedbackUptake> = uptake
            .iter()
            .filter(|u| u.round == round.round_number)
            .collect();
        if items.is_empty() {
            rounds.push_str("- geen nieuwe feedbackpunten\n");
        }
        for u in items {
            let passage = if u.passage_retained {
                "passage ongewijzigd in eindversie"
            } else {
                "passage aangepast of verwijderd"
            };
            rounds.push_str(&format!(
                "- zin {}, {} ({}): {}\n  status: {}; {}\n",
                u.sentence_index + 1,
                u.criterion_label,
                u.category.label_nl(),
                u.hint,
                status_nl(u.status),
                passage,
            ));
        }
    }
    if rounds.is_empty() {
        rounds.push_str("Geen feedback aangevraagd.");
    }

    format!(
        "\
Niveau: {niveau}

Opdracht van de docent:
{assignment}

Criteria die de docent heeft ingesteld:
{criteria}

Versie 1 (bij eerste feedback):
{first}

Eindversie:
{final_text}

Alle feedbackrondes:
{rounds}

Laatste checklist:
{checklist}

Schrijf nu het feedbackrapport volgens de structuur hierboven.",
        niveau = ctx.niveau,
        assignment = ctx.assignment_text,
        first = ctx.first_version.unwrap_or("Niet beschikbaar"),
        final_text = ctx.final_text,
        checklist = checklist_summary(ctx.last_checklist),
    )
}

/// The narrative section of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Narrative {
    Generated(String),
    /// Generation failed; the fallback sentence stands in.
    Unavailable { reason: String },
}

impl Narrative {
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Unavailable { .. } => NARRATIVE_FALLBACK,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Generate and scrub the narrative. Never fails.
pub async fn synthesize_narrative<G: ReportGenerator + ?Sized>(
    generator: &G,
    ctx: &ReportContext<'_>,
    timeout: Option<Duration>,
) -> Narrative {
    let request = compose_report_prompt(ctx);
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, generator.generate_report(&request))
            .await
            .unwrap_or(Err(RemoteError::Timeout(limit))),
        None => generator.generate_report(&request).await,
    };

    match outcome {
        Ok(text) if !text.trim().is_empty() => {
            let scrubbed = scrub_verbatim(text.trim(), &ctx.student_texts());
            info!(chars = scrubbed.chars().count(), "reflection narrative generated");
            Narrative::Generated(scrubbed)
        }
        Ok(_) => {
            warn!("reflection narrative empty, using fallback");
            Narrative::Unavailable {
                reason: RemoteError::EmptyContent.to_string(),
            }
        }
        Err(e) => {
            warn!(error = %e, "reflection narrative unavailable, using fallback");
            Narrative::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

struct Word {
    start: usize,
    end: usize,
    norm: String,
}

/// Whitespace-separated words with byte ranges, compared without case or edge punctuation.
fn words(text: &str) -> Vec<Word> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                let norm = text[s..i]
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase();
                if !norm.is_empty() {
                    out.push(Word { start: s, end: i, norm });
                }
                start = None;
            }
            _ => {}
        }
    }
    out
}

/// Replace every run of [`VERBATIM_RUN_WORDS`]+ words copied from `sources` with `[…]`.
pub fn scrub_verbatim(narrative: &str, sources: &[&str]) -> String {
    let n = VERBATIM_RUN_WORDS;
    let grams: HashSet<Vec<String>> = sources
        .iter()
        .flat_map(|s| {
            let w: Vec<String> = words(s).into_iter().map(|w| w.norm).collect();
            w.windows(n).map(<[String]>::to_vec).collect::<Vec<_>>()
        })
        .collect();
    if grams.is_empty() {
        return narrative.to_string();
    }

    let tokens = words(narrative);
    let mut copied = vec![false; tokens.len()];
    for (i, window) in tokens.windows(n).enumerate() {
        let key: Vec<String> = window.iter().map(|w| w.norm.clone()).collect();
        if grams.contains(&key) {
            copied[i..i + n].iter_mut().for_each(|c| *c = true);
        }
    }

    let mut out = String::with_capacity(narrative.len());
    let mut cursor = 0;
    let mut i = 0;
    while i < tokens.len() {
        if !copied[i] {
            i += 1;
            continue;
        }
        let mut j = i;
        while j + 1 < tokens.len() && copied[j + 1] {
            j += 1;
        }
        out.push_str(&narrative[cursor..tokens[i].start]);
        out.push_str(REDACTED);
        cursor = tokens[j].end;
        i = j + 1;
    }
    out.push_str(&narrative[cursor..]);
    out
}

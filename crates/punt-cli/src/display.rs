//! Terminal cards for feedback rounds, session status and rubric listings.

use chrono::{DateTime, Utc};
use punt_core::{
    AssignmentConfig, ChecklistResult, FeedbackRound, Niveau, RubricCatalog, SessionState,
    TextSpan, count_words,
};

const EXCERPT_CHARS: usize = 60;

/// The passage a span covers, shortened for one terminal line.
fn excerpt(text: &str, span: TextSpan) -> String {
    let Some(passage) = span.slice(text) else {
        return String::new();
    };
    let passage = passage.trim();
    if passage.chars().count() <= EXCERPT_CHARS {
        return passage.to_string();
    }
    let mut short: String = passage.chars().take(EXCERPT_CHARS - 1).collect();
    short.push('…');
    short
}

fn print_checklist(checklist: &[ChecklistResult]) {
    if checklist.is_empty() {
        return;
    }
    println!("Checklist");
    for c in checklist {
        let mark = if c.met { "✔" } else { "✘" };
        println!("  {mark} {:<30} {}", c.label, c.explanation);
    }
    println!();
}

/// Print one round as a card: checklist first, then the located feedback items.
pub fn print_round(round: &FeedbackRound) {
    println!("=== Feedbackronde {} ===", round.round_number);
    println!();
    print_checklist(&round.checklist);

    println!("Feedback");
    if round.feedback_items.is_empty() {
        println!("  Geen nieuwe feedbackpunten.");
    }
    for item in &round.feedback_items {
        println!(
            "  [{}] {} · {} ({})",
            item.id,
            item.category.label_nl(),
            item.criterion_label,
            item.color.as_str()
        );
        println!(
            "      zin {}: \"{}\"",
            item.sentence_index + 1,
            excerpt(&round.text_snapshot, item.span)
        );
        println!("      {}", item.hint);
    }
    if round.rejected_candidates > 0 {
        println!("  ({} punt(en) weggelaten)", round.rejected_candidates);
    }
    println!();
}

pub fn print_tokens(remaining: u8) {
    println!("Feedbacktokens over: {remaining}");
}

pub fn print_status(assignment: &AssignmentConfig, session: &SessionState, now: DateTime<Utc>) {
    println!("=== {} ===", session.code());
    println!();
    println!("Opdracht");
    println!("  {:<22} {}", "niveau", assignment.level.level_name());
    println!("  {:<22} {}", "criteria", assignment.selected_criteria().count());
    println!();
    println!("Sessie");
    println!("  {:<22} {}", "woorden", count_words(session.text()));
    println!("  {:<22} {}", "tokens", session.tokens_remaining());
    println!("  {:<22} {}", "rondes", session.history().len());
    println!("  {:<22} {}", "sessieduur (min)", session.elapsed_minutes(now));
    println!(
        "  {:<22} {}",
        "copy-paste",
        if session.large_paste_detected() { "ja" } else { "nee" }
    );
    println!();
    print_checklist(session.last_checklist());

    let open: Vec<_> = session.highlights().collect();
    if !open.is_empty() {
        println!("Open feedback");
        for item in open {
            println!(
                "  [{}] zin {}: {}",
                item.id,
                item.sentence_index + 1,
                item.hint
            );
        }
    }
}

pub fn print_rubric(catalog: &RubricCatalog, level: Niveau) {
    let Some(info) = catalog.level(level) else {
        println!("Geen criteria voor {level}.");
        return;
    };
    println!("=== {} ===", info.level_name);
    println!("{}", info.description);
    println!();
    for (group, sections) in catalog.grouped(level) {
        println!("{group:?}");
        for section in sections {
            println!("  {}", section.category);
            for entry in &section.criteria {
                println!("    {:<8} {:<36} {}", entry.id, entry.label, entry.description);
            }
        }
        println!();
    }
}

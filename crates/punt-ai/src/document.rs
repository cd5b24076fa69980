//! Export document for the teacher: texts, checklist, narrative and integrity log.
//!
//! Assembly never fails; a missing narrative is replaced by the fallback
//! sentence before the document is built.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use punt_core::{
    AssignmentConfig, ChecklistResult, Criterion, FeedbackStatus, Niveau, SessionState,
    count_words,
};
use tracing::info;

use crate::generator::ReportGenerator;
use crate::report::{Narrative, ReportContext, synthesize_narrative};

const NO_FEEDBACK_NOTE: &str =
    "Leerling heeft in deze sessie geen tussentijdse feedback opgevraagd via het systeem.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMetadata {
    pub code: String,
    pub niveau: Niveau,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityFlags {
    pub large_paste_detected: bool,
    pub session_minutes: i64,
    pub feedback_requested: bool,
    pub word_count: usize,
}

/// Word counts of the first-feedback version against the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionComparison {
    pub first_words: usize,
    pub final_words: usize,
}

impl VersionComparison {
    pub fn delta(&self) -> i64 {
        self.final_words as i64 - self.first_words as i64
    }

    pub fn summary_nl(&self) -> String {
        let change = match self.delta() {
            d if d > 0 => format!("uitgebreid met {d} woorden"),
            d if d < 0 => format!("ingekort met {} woorden", d.unsigned_abs()),
            _ => "niet significant gewijzigd in lengte".to_string(),
        };
        format!("De leerling heeft na feedback de tekst {change}.")
    }
}

/// One row of the rounds overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub round_number: u8,
    pub requested_at: String,
    pub items: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub checklist_met: usize,
    pub checklist_total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub metadata: ReportMetadata,
    pub assignment_text: String,
    pub criteria: Vec<Criterion>,
    pub first_version: Option<String>,
    pub final_text: String,
    pub comparison: Option<VersionComparison>,
    pub checklist: Vec<ChecklistResult>,
    pub rounds: Vec<RoundSummary>,
    pub narrative: Narrative,
    pub integrity: IntegrityFlags,
}

impl ReportDocument {
    pub fn assemble(
        session: &SessionState,
        assignment: &AssignmentConfig,
        narrative: Narrative,
        now: DateTime<Utc>,
    ) -> Self {
        let first_version = session.first_feedback_version().map(str::to_string);
        let comparison = first_version.as_deref().map(|first| VersionComparison {
            first_words: count_words(first),
            final_words: count_words(session.text()),
        });
        let rounds = session
            .history()
            .iter()
            .map(|r| {
                let with_status = |s: FeedbackStatus| {
                    r.feedback_items.iter().filter(|i| i.status == s).count()
                };
                RoundSummary {
                    round_number: r.round_number,
                    requested_at: r.requested_at.clone(),
                    items: r.feedback_items.len(),
                    accepted: with_status(FeedbackStatus::Accepted),
                    rejected: with_status(FeedbackStatus::Rejected),
                    checklist_met: r.checklist_met(),
                    checklist_total: r.checklist.len(),
                }
            })
            .collect();

        Self {
            metadata: ReportMetadata {
                code: session.code().to_uppercase(),
                niveau: assignment.level,
                exported_at: now,
            },
            assignment_text: assignment.assignment_text.clone(),
            criteria: assignment.selected_criteria().cloned().collect(),
            first_version,
            final_text: session.text().to_string(),
            comparison,
            checklist: session.last_checklist().to_vec(),
            rounds,
            narrative,
            integrity: IntegrityFlags {
                large_paste_detected: session.large_paste_detected(),
                session_minutes: session.elapsed_minutes(now),
                feedback_requested: session.feedback_requested(),
                word_count: count_words(session.text()),
            },
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "opdracht-{}-{}.html",
            self.metadata.code,
            self.metadata.exported_at.format("%Y-%m-%d")
        )
    }

    /// Self-contained HTML page.
    pub fn render_html(&self) -> String {
        let mut html = String::with_capacity(8 * 1024);
        html.push_str(HTML_HEAD);

        let m = &self.metadata;
        let _ = write!(
            html,
            "  <h1>PUNT! Schrijfomgeving - Opdracht</h1>
  <div class=\"metadata\">
    <p><strong>Code:</strong> {code}</p>
    <p><strong>Niveau:</strong> {niveau}</p>
    <p><strong>Datum:</strong> {date}</p>
  </div>
",
            code = escape(&m.code),
            niveau = escape(m.niveau.level_name()),
            date = m.exported_at.format("%d-%m-%Y"),
        );

        section(&mut html, "Opdracht", &self.assignment_text);

        html.push_str("  <h2>Beoordelingscriteria</h2>\n  <div>\n");
        for c in &self.criteria {
            let class = if c.is_checklist() { "badge checklist" } else { "badge" };
            let _ = writeln!(html, "    <span class=\"{class}\">{}</span>", escape(&c.label));
        }
        html.push_str("  </div>\n");

        match (&self.first_version, &self.comparison) {
            (Some(first), Some(comparison)) => {
                section(&mut html, "Versie 1 (Eerste feedback moment)", first);
                section(&mut html, "Definitieve Versie", &self.final_text);
                let _ = write!(
                    html,
                    "  <h2>Ontwikkeling</h2>\n  <p>{}</p>\n",
                    escape(&comparison.summary_nl())
                );
            }
            _ => {
                section(&mut html, "Geschreven Tekst", &self.final_text);
                let _ = write!(
                    html,
                    "  <div class=\"metadata\">\n    <p><strong>Let op:</strong> {}</p>\n  </div>\n",
                    escape(NO_FEEDBACK_NOTE)
                );
            }
        }

        if !self.checklist.is_empty() {
            html.push_str("  <h2>Checklist – docent-eisen</h2>\n  <ul class=\"checklist\">\n");
            for c in &self.checklist {
                let (class, mark) = if c.met { ("met", "✔") } else { ("unmet", "✘") };
                let _ = writeln!(
                    html,
                    "    <li class=\"{class}\">{mark} <strong>{}</strong>: {}</li>",
                    escape(&c.label),
                    escape(&c.explanation)
                );
            }
            html.push_str("  </ul>\n");
        }

        if !self.rounds.is_empty() {
            html.push_str(
                "  <h2>Feedbackrondes</h2>\n  <table>\n    <tr><th>Ronde</th><th>Punten</th><th>Geaccepteerd</th><th>Afgewezen</th><th>Checklist</th></tr>\n",
            );
            for r in &self.rounds {
                let _ = writeln!(
                    html,
                    "    <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td></tr>",
                    r.round_number, r.items, r.accepted, r.rejected, r.checklist_met, r.checklist_total
                );
            }
            html.push_str("  </table>\n");
        }

        section(&mut html, "Feedbackrapport", self.narrative.text());

        let i = &self.integrity;
        let _ = write!(
            html,
            "  <h2>Integriteitslog</h2>
  <div class=\"metadata\">
    <p><strong>Copy-paste gedetecteerd:</strong> {paste}</p>
    <p><strong>Aantal woorden:</strong> {words}</p>
    <p><strong>Feedback aangevraagd:</strong> {requested}</p>
    <p><strong>Sessieduur:</strong> {minutes} minuten</p>
  </div>
  <div class=\"footer\">
    <p>Gegenereerd door PUNT! - Een intelligente schrijfomgeving voor het onderwijs.</p>
    <p>© {year} - Dit document is automatisch gegenereerd.</p>
  </div>
</body>
</html>
",
            paste = yes_no(i.large_paste_detected),
            words = i.word_count,
            requested = yes_no(i.feedback_requested),
            minutes = i.session_minutes,
            year = m.exported_at.year(),
        );
        html
    }
}

/// Synthesize the narrative and assemble the export. Never fails.
pub async fn export_report<G: ReportGenerator + ?Sized>(
    generator: &G,
    session: &SessionState,
    assignment: &AssignmentConfig,
    timeout: Option<Duration>,
) -> ReportDocument {
    let ctx = ReportContext::from_session(session, assignment);
    let narrative = synthesize_narrative(generator, &ctx, timeout).await;
    let doc = ReportDocument::assemble(session, assignment, narrative, Utc::now());
    info!(
        code = %doc.metadata.code,
        rounds = doc.rounds.len(),
        fallback = doc.narrative.is_fallback(),
        "report assembled"
    );
    doc
}

fn section(html: &mut String, title: &str, body: &str) {
    let _ = write!(
        html,
        "  <h2>{}</h2>\n  <div class=\"text-block\">{}</div>\n",
        escape(title),
        escape(body)
    );
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Ja" } else { "Nee" }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html lang="nl">
<head>
  <meta charset="UTF-8">
  <title>PUNT! Schrijfomgeving - Opdracht</title>
  <style>
    body { font-family: Georgia, serif; max-width: 800px; margin: 40px auto; padding: 20px; line-height: 1.6; color: #333; }
    h1 { color: #6366f1; border-bottom: 2px solid #6366f1; padding-bottom: 10px; }
    h2 { color: #4f46e5; margin-top: 30px; }
    .metadata { background: #f3f4f6; padding: 15px; border-radius: 5px; margin: 20px 0; }
    .text-block { background: #fff; border: 1px solid #e5e7eb; padding: 20px; border-radius: 5px; margin: 20px 0; white-space: pre-wrap; }
    .badge { display: inline-block; background: #e0e7ff; color: #4f46e5; padding: 4px 12px; border-radius: 4px; font-size: 14px; margin: 5px 5px 5px 0; }
    .badge.checklist { background: #fef3c7; color: #92400e; }
    .checklist li.met { color: #166534; }
    .checklist li.unmet { color: #991b1b; }
    table { border-collapse: collapse; }
    th, td { border: 1px solid #e5e7eb; padding: 4px 10px; text-align: left; }
    .footer { margin-top: 40px; padding-top: 20px; border-top: 1px solid #e5e7eb; font-size: 12px; color: #6b7280; }
  </style>
</head>
<body>
"#;

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use punt_core::{FeedbackRound, RemoteError};

    use super::*;
    use crate::generator::GenerateRequest;
    use crate::report::NARRATIVE_FALLBACK;

    struct Down;

    #[async_trait]
    impl ReportGenerator for Down {
        async fn generate_report(&self, _request: &GenerateRequest) -> Result<String, RemoteError> {
            Err(RemoteError::Unavailable("dns failure".into()))
        }
    }

    fn assignment() -> AssignmentConfig {
        AssignmentConfig {
            level: Niveau::F3,
            assignment_text: "Schrijf een betoog over schooltijden.".into(),
            criteria: vec![
                Criterion::checklist("c1", "heeft een titel", ""),
                Criterion::rubric("r1", "onderbouwing", ""),
            ],
        }
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, min, 0).unwrap()
    }

    fn session_with_round() -> SessionState {
        let mut session = SessionState::started("abcd2345", at(9, 0));
        session.set_text("Scholen moeten later beginnen.").unwrap();
        let reservation = session.reserve().unwrap();
        reservation.commit(FeedbackRound {
            round_number: 1,
            feedback_items: vec![],
            checklist: vec![ChecklistResult {
                id: "c1".into(),
                label: "heeft een titel".into(),
                met: false,
                explanation: "Geen titel.".into(),
            }],
            text_snapshot: "Scholen moeten later beginnen.".into(),
            requested_at: at(9, 10).to_rfc3339(),
            rejected_candidates: 0,
        });
        session
            .set_text("Scholen moeten later beginnen, want leerlingen slapen te kort.")
            .unwrap();
        session
    }

    #[tokio::test]
    async fn failing_narrative_still_exports() {
        let session = session_with_round();
        let assignment = assignment();
        let doc = export_report(&Down, &session, &assignment, None).await;

        assert!(doc.narrative.is_fallback());
        let html = doc.render_html();
        assert!(html.contains("Schrijf een betoog over schooltijden."));
        assert!(html.contains("Scholen moeten later beginnen, want leerlingen slapen te kort."));
        assert!(html.contains(NARRATIVE_FALLBACK));
        assert!(html.contains("Versie 1 (Eerste feedback moment)"));
    }

    #[test]
    fn assembles_metadata_and_integrity() {
        let mut session = session_with_round();
        session.record_paste(&"x".repeat(150));
        let doc = ReportDocument::assemble(
            &session,
            &assignment(),
            Narrative::Generated("Rapport.".into()),
            at(9, 45),
        );

        assert_eq!(doc.metadata.code, "ABCD2345");
        assert_eq!(doc.file_name(), "opdracht-ABCD2345-2026-03-02.html");
        assert_eq!(
            doc.integrity,
            IntegrityFlags {
                large_paste_detected: true,
                session_minutes: 45,
                feedback_requested: true,
                word_count: 9,
            }
        );
        assert_eq!(doc.comparison.map(|c| c.delta()), Some(5));
        assert_eq!(doc.rounds[0].checklist_total, 1);

        let html = doc.render_html();
        assert!(html.contains("<strong>Copy-paste gedetecteerd:</strong> Ja"));
        assert!(html.contains("<strong>Sessieduur:</strong> 45 minuten"));
        assert!(html.contains("uitgebreid met 5 woorden"));
        assert!(html.contains("✘ <strong>heeft een titel</strong>: Geen titel."));
        assert!(html.contains("<strong>Datum:</strong> 02-03-2026"));
    }

    #[test]
    fn without_feedback_shows_note() {
        let mut session = SessionState::started("WXYZ6789", at(9, 0));
        session.set_text("Een korte tekst.").unwrap();
        let doc = ReportDocument::assemble(
            &session,
            &assignment(),
            Narrative::Unavailable {
                reason: "skipped".into(),
            },
            at(9, 5),
        );

        assert!(doc.first_version.is_none());
        let html = doc.render_html();
        assert!(html.contains("<h2>Geschreven Tekst</h2>"));
        assert!(html.contains(NO_FEEDBACK_NOTE));
        assert!(!html.contains("Versie 1"));
        assert!(!html.contains("<h2>Feedbackrondes</h2>"));
        assert!(html.contains("<strong>Feedback aangevraagd:</strong> Nee"));
    }

    #[test]
    fn student_text_is_escaped() {
        let mut session = SessionState::started("WXYZ6789", at(9, 0));
        session
            .set_text("<script>alert('x')</script> & \"meer\"")
            .unwrap();
        let doc = ReportDocument::assemble(
            &session,
            &assignment(),
            Narrative::Generated("ok".into()),
            at(9, 1),
        );
        let html = doc.render_html();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; &quot;meer&quot;"));
    }

    #[test]
    fn comparison_summaries() {
        let cmp = |first_words, final_words| VersionComparison {
            first_words,
            final_words,
        };
        assert_eq!(
            cmp(10, 25).summary_nl(),
            "De leerling heeft na feedback de tekst uitgebreid met 15 woorden."
        );
        assert_eq!(
            cmp(30, 22).summary_nl(),
            "De leerling heeft na feedback de tekst ingekort met 8 woorden."
        );
        assert_eq!(
            cmp(12, 12).summary_nl(),
            "De leerling heeft na feedback de tekst niet significant gewijzigd in lengte."
        );
    }
}

//! Prompt templates for feedback rounds.
//!
//! Two tagged variants: the first round, and follow-up rounds that carry a
//! "do not repeat" list. Each renders a [`GenerateRequest`] as a pure function
//! of the [`PromptContext`].

use punt_core::assignment::partition;
use punt_core::{Criterion, Niveau, PriorFeedback, SegmentTable};

use crate::generator::GenerateRequest;
use crate::interpret::MAX_FRAGMENT_WORDS;

/// Hard cap on feedback items per round, also enforced by the interpreter.
pub const MAX_FEEDBACK_ITEMS: usize = 5;

const FEEDBACK_TEMPERATURE: f32 = 0.3;
const FEEDBACK_MAX_TOKENS: u32 = 1500;
const PRIOR_HINT_WORDS: usize = 12;

/// Everything a feedback prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub text: &'a str,
    pub assignment_text: &'a str,
    pub niveau: Niveau,
    pub criteria: &'a [Criterion],
    pub round: u8,
    pub prior: &'a [PriorFeedback],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    FirstRound,
    FollowUp { round: u8 },
}

impl PromptTemplate {
    pub fn for_round(round: u8) -> Self {
        if round <= 1 {
            Self::FirstRound
        } else {
            Self::FollowUp { round }
        }
    }

    pub fn render(&self, ctx: &PromptContext<'_>) -> GenerateRequest {
        let mut system_prompt = system_prompt(ctx.niveau);
        let mut user_prompt = context_block(ctx);

        if let Self::FollowUp { round } = self {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&follow_up_rules(*round));
            user_prompt.push_str(&prior_block(ctx.prior));
        }
        user_prompt.push_str("\nGeef nu alleen het JSON-object.");

        GenerateRequest {
            system_prompt,
            user_prompt,
            temperature: FEEDBACK_TEMPERATURE,
            json_output: true,
            max_tokens: Some(FEEDBACK_MAX_TOKENS),
        }
    }
}

/// Build the request for `ctx.round` using the matching template.
pub fn compose(ctx: &PromptContext<'_>) -> GenerateRequest {
    PromptTemplate::for_round(ctx.round).render(ctx)
}

fn system_prompt(niveau: Niveau) -> String {
    format!(
        "\
Je bent een schrijfcoach die Nederlandse leerlingen helpt hun schrijfvaardigheid te verbeteren op referentieniveau {niveau}.

Je krijgt een schrijfopdracht, de tekst van de leerling in genummerde zinnen, \
een checklist met eisen van de docent en beoordelingscriteria.

Je taak:
1. Beoordeel ELKE checklist-eis opnieuw op basis van de huidige tekst, ook als je hem eerder al beoordeeld hebt. \
Geef per eis \"met\": true of false en een korte uitleg.
2. Geef maximaal {max} feedbackpunten op basis van de beoordelingscriteria. Minder mag, ook nul.
3. Verwijs bij elk punt naar het zinsnummer (\"sentence\"). Gebruik \"fragment\" alleen voor maximaal \
{fragment} woorden die letterlijk in die zin staan.
4. Kies het type: \"spelling\", \"grammar\", \"structure\" of \"content\".

VERBODEN:
- Herschrijf NOOIT zinnen en geef GEEN verbeterde versie, voorbeeldzin of vervangende tekst.
- Benoem alleen WAAR iets beter kan en WAT de leerling moet doen: toevoegen, weghalen, verplaatsen of anders formuleren.

Antwoord ALLEEN met een JSON-object, zonder markdown of uitleg:
{{
  \"checklistResults\": [
    {{ \"id\": \"id van de eis\", \"label\": \"naam van de eis\", \"met\": false, \"explanation\": \"korte uitleg\" }}
  ],
  \"feedbackItems\": [
    {{ \"sentence\": 1, \"fragment\": \"optioneel\", \"category\": \"content\", \"criterionLabel\": \"naam van het criterium\", \"hint\": \"wat de leerling moet doen\" }}
  ]
}}",
        niveau = niveau,
        max = MAX_FEEDBACK_ITEMS,
        fragment = MAX_FRAGMENT_WORDS,
    )
}

fn follow_up_rules(round: u8) -> String {
    format!(
        "\
Dit is feedbackronde {round} van 3. De leerling heeft de tekst mogelijk aangepast. \
Onder \"EERDER GEGEVEN FEEDBACK\" staat wat de leerling al gehoord heeft. Herhaal die punten NIET: \
geef alleen nieuwe punten over andere zinnen of andere criteria. \
Zijn er geen nieuwe problemen, geef dan een lege lijst \"feedbackItems\". \
De checklist beoordeel je wel volledig opnieuw."
    )
}

fn context_block(ctx: &PromptContext<'_>) -> String {
    let (checklist, content) = partition(ctx.criteria);

    let checklist_lines = if checklist.is_empty() {
        "Geen checklist-eisen.".to_string()
    } else {
        checklist
            .iter()
            .map(|c| format!("- [{}] {}{}", c.id, c.label, description_suffix(c)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let criteria_lines = if content.is_empty() {
        "Geen aanvullende criteria: geef alleen feedback op spelling, grammatica en structuur."
            .to_string()
    } else {
        content
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}{}", i + 1, c.label, description_suffix(c)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let table = SegmentTable::new(ctx.text);
    let sentences = table
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {}", i + 1, collapse_whitespace(s.text)))
        .collect::<Vec<_>>()
        .join("\n");

    let assignment = if ctx.assignment_text.trim().is_empty() {
        "Geen specifieke opdracht gegeven"
    } else {
        ctx.assignment_text.trim()
    };

    format!(
        "\
NIVEAU: {niveau}

OPDRACHT:
{assignment}

CHECKLIST (eisen van de docent, beoordeel elke eis opnieuw):
{checklist_lines}

BEOORDELINGSCRITERIA:
{criteria_lines}

LEERLINGTEKST (genummerde zinnen):
{sentences}
",
        niveau = ctx.niveau,
    )
}

fn prior_block(prior: &[PriorFeedback]) -> String {
    if prior.is_empty() {
        return "\nEERDER GEGEVEN FEEDBACK: geen.\n".to_string();
    }
    let lines = prior
        .iter()
        .map(|p| {
            format!(
                "- ronde {}, zin {}, {} ({}): {}",
                p.round,
                p.sentence_index + 1,
                p.criterion_label,
                p.category.label_nl(),
                shorten(&p.hint, PRIOR_HINT_WORDS),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "\nEERDER GEGEVEN FEEDBACK (niet herhalen; zinsnummers verwijzen naar de versie van toen):\n{lines}\n"
    )
}

fn description_suffix(c: &Criterion) -> String {
    let d = c.description.trim();
    if d.is_empty() {
        String::new()
    } else {
        format!(": {d}")
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn shorten(s: &str, max_words: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        format!("{} …", words[..max_words].join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punt_core::{FeedbackCategory, FeedbackStatus};

    const TEXT: &str = "Ik ga morgen naar school. Het weer is mooi.";

    fn criteria() -> Vec<Criterion> {
        let mut hidden = Criterion::rubric("r9", "Register", "formeel of informeel");
        hidden.selected = false;
        vec![
            Criterion::checklist("c1", "heeft een titel", ""),
            Criterion::rubric("r1", "gebruik van voorbeelden", "concrete voorbeelden"),
            hidden,
        ]
    }

    fn prior() -> Vec<PriorFeedback> {
        vec![PriorFeedback {
            round: 1,
            sentence_index: 1,
            criterion_label: "gebruik van voorbeelden".into(),
            category: FeedbackCategory::Content,
            hint: "Voeg een voorbeeld toe dat laat zien waarom het weer belangrijk is voor je dag op school.".into(),
            status: FeedbackStatus::Open,
        }]
    }

    fn ctx<'a>(criteria: &'a [Criterion], round: u8, prior: &'a [PriorFeedback]) -> PromptContext<'a> {
        PromptContext {
            text: TEXT,
            assignment_text: "Schrijf over je weekend.",
            niveau: Niveau::F2,
            criteria,
            round,
            prior,
        }
    }

    #[test]
    fn template_by_round() {
        assert_eq!(PromptTemplate::for_round(1), PromptTemplate::FirstRound);
        assert_eq!(PromptTemplate::for_round(3), PromptTemplate::FollowUp { round: 3 });
    }

    #[test]
    fn first_round_has_no_repeat_instruction() {
        let criteria = criteria();
        let req = compose(&ctx(&criteria, 1, &[]));
        assert!(!req.system_prompt.contains("Herhaal die punten NIET"));
        assert!(!req.user_prompt.contains("EERDER GEGEVEN FEEDBACK"));
        assert!(req.json_output);
    }

    #[test]
    fn follow_up_lists_prior_feedback() {
        let criteria = criteria();
        let prior = prior();
        let req = compose(&ctx(&criteria, 2, &prior));
        assert!(req.system_prompt.contains("feedbackronde 2 van 3"));
        assert!(req.system_prompt.contains("Herhaal die punten NIET"));
        assert!(req.user_prompt.contains("- ronde 1, zin 2, gebruik van voorbeelden (inhoud): Voeg een"));
        assert!(req.user_prompt.contains("…"));
    }

    #[test]
    fn follow_up_without_prior_says_none() {
        let criteria = criteria();
        let req = compose(&ctx(&criteria, 2, &[]));
        assert!(req.user_prompt.contains("EERDER GEGEVEN FEEDBACK: geen."));
    }

    #[test]
    fn criteria_are_partitioned_and_filtered() {
        let criteria = criteria();
        let req = compose(&ctx(&criteria, 1, &[]));
        assert!(req.user_prompt.contains("- [c1] heeft een titel"));
        assert!(req.user_prompt.contains("1. gebruik van voorbeelden: concrete voorbeelden"));
        assert!(!req.user_prompt.contains("Register"));
    }

    #[test]
    fn sentences_are_numbered_from_one() {
        let criteria = criteria();
        let req = compose(&ctx(&criteria, 1, &[]));
        assert!(req.user_prompt.contains("[1] Ik ga morgen naar school.\n[2] Het weer is mooi."));
    }

    #[test]
    fn no_rewrite_rule_and_cap_are_explicit() {
        let criteria = criteria();
        for round in 1..=3 {
            let req = compose(&ctx(&criteria, round, &[]));
            assert!(req.system_prompt.contains("Herschrijf NOOIT zinnen"));
            assert!(req.system_prompt.contains("maximaal 5 feedbackpunten"));
        }
    }

    #[test]
    fn shorten_truncates_long_hints() {
        assert_eq!(shorten("een twee drie", 2), "een twee …");
        assert_eq!(shorten("  een   twee ", 5), "een twee");
    }
}

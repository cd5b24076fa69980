//! Assignment-specific criterion suggestions for teachers.

use punt_core::{Criterion, FeedbackError, Niveau, ValidationError};
use serde::Deserialize;
use tracing::{info, warn};

use crate::generator::{FeedbackGenerator, GenerateRequest};
use crate::interpret::parse_reply;

const MAX_SUGGESTIONS: usize = 3;
const SUGGEST_TEMPERATURE: f32 = 0.5;

#[derive(Debug, Deserialize)]
struct Suggestions {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
struct Suggestion {
    #[serde(default)]
    label: String,
    #[serde(default)]
    description: String,
}

fn suggest_prompt(assignment_text: &str, niveau: Niveau) -> GenerateRequest {
    let user_prompt = format!(
        "\
Analyseer de volgende schrijfopdracht voor niveau {niveau} en geef 2-3 specifieke beoordelingscriteria die passen bij deze opdracht.

Opdracht:
{assignment_text}

Geef de criteria terug in dit exacte JSON-formaat:
{{
  \"suggestions\": [
    {{ \"label\": \"Korte naam van het criterium\", \"description\": \"Concrete beschrijving van wat je beoordeelt\" }}
  ]
}}

Let op:
- Maak de criteria specifiek voor deze opdracht, niet algemeen.
- Richt je op aspecten die relevant zijn voor dit type tekst.
- Houd rekening met niveau {niveau}.
- Geef 2-3 criteria."
    );
    GenerateRequest {
        system_prompt: "Je bent een expert in taaldidactiek en beoordelingscriteria voor het Nederlandse onderwijs."
            .to_string(),
        user_prompt,
        temperature: SUGGEST_TEMPERATURE,
        json_output: true,
        max_tokens: Some(600),
    }
}

fn slug(label: &str) -> String {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Ask for up to three criteria tailored to the assignment.
///
/// Suggestions come back selected, with `ai-` ids. A reply that cannot be
/// read yields no suggestions rather than an error.
pub async fn suggest_criteria<G: FeedbackGenerator + ?Sized>(
    generator: &G,
    assignment_text: &str,
    niveau: Niveau,
) -> Result<Vec<Criterion>, FeedbackError> {
    if assignment_text.trim().is_empty() {
        return Err(ValidationError::EmptyAssignment.into());
    }

    let reply = generator
        .generate_feedback(&suggest_prompt(assignment_text.trim(), niveau))
        .await?;

    let Some(parsed) = parse_reply(&reply.text)
        .and_then(|v| serde_json::from_value::<Suggestions>(v).ok())
    else {
        warn!("criterion suggestions unreadable");
        return Ok(Vec::new());
    };

    let criteria: Vec<Criterion> = parsed
        .suggestions
        .into_iter()
        .filter(|s| !s.label.trim().is_empty())
        .take(MAX_SUGGESTIONS)
        .enumerate()
        .map(|(i, s)| {
            let label = s.label.trim();
            Criterion::rubric(
                format!("ai-{}-{}", i + 1, slug(label)),
                label,
                s.description.trim(),
            )
        })
        .collect();
    info!(count = criteria.len(), %niveau, "criterion suggestions received");
    Ok(criteria)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use punt_core::{CriterionOrigin, RemoteError};

    use super::*;
    use crate::generator::GeneratedReply;

    struct Fixed(Result<&'static str, RemoteError>);

    #[async_trait]
    impl FeedbackGenerator for Fixed {
        async fn generate_feedback(
            &self,
            request: &GenerateRequest,
        ) -> Result<GeneratedReply, RemoteError> {
            assert!(request.user_prompt.contains("niveau 2F"));
            self.0.clone().map(GeneratedReply::from_text)
        }
    }

    #[tokio::test]
    async fn suggestions_become_selected_rubric_criteria() {
        let generator = Fixed(Ok(r#"{"suggestions": [
            {"label": "Overtuigende argumenten", "description": "Minstens twee argumenten met uitleg."},
            {"label": "  ", "description": "leeg"},
            {"label": "Aanspreekvorm", "description": "Past de aanhef bij de ontvanger?"},
            {"label": "Slot", "description": "Sluit af met een oproep."},
            {"label": "Extra", "description": "te veel"}
        ]}"#));
        let criteria = suggest_criteria(&generator, "Schrijf een brief aan de gemeente.", Niveau::F2)
            .await
            .unwrap();

        assert_eq!(criteria.len(), 3);
        assert_eq!(criteria[0].id, "ai-1-overtuigende-argumenten");
        assert_eq!(criteria[0].origin, CriterionOrigin::Rubric);
        assert!(criteria[0].selected);
        assert_eq!(criteria[1].label, "Aanspreekvorm");
        assert_eq!(criteria[2].label, "Slot");
    }

    #[tokio::test]
    async fn unreadable_reply_yields_none() {
        let generator = Fixed(Ok("Dat weet ik niet."));
        let criteria = suggest_criteria(&generator, "Schrijf een verhaal.", Niveau::F2)
            .await
            .unwrap();
        assert!(criteria.is_empty());
    }

    #[tokio::test]
    async fn empty_assignment_is_rejected_before_calling() {
        struct Unreachable;

        #[async_trait]
        impl FeedbackGenerator for Unreachable {
            async fn generate_feedback(
                &self,
                _request: &GenerateRequest,
            ) -> Result<GeneratedReply, RemoteError> {
                panic!("generator must not be called");
            }
        }

        let err = suggest_criteria(&Unreachable, "  ", Niveau::F1)
            .await
            .unwrap_err();
        assert_eq!(err, FeedbackError::Validation(ValidationError::EmptyAssignment));
    }

    #[tokio::test]
    async fn remote_failure_is_surfaced() {
        let generator = Fixed(Err(RemoteError::Status {
            status: 401,
            body: "bad key".into(),
        }));
        let err = suggest_criteria(&generator, "Schrijf een verhaal.", Niveau::F2)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::RemoteUnavailable(RemoteError::Status { status: 401, .. })));
    }
}

//! Teacher-configured assignment data consumed read-only by the feedback engine.

use serde::{Deserialize, Serialize};

use crate::Niveau;

/// Where a criterion came from.
///
/// Checklist criteria are requirements from the assignment itself and are
/// evaluated as met/unmet every round. Rubric criteria drive open feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriterionOrigin {
    AssignmentChecklist,
    #[default]
    Rubric,
}

/// A single assessment criterion selected (or offered) by the teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub origin: CriterionOrigin,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

impl Criterion {
    /// A selected rubric criterion.
    pub fn rubric(
        id: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: description.into(),
            origin: CriterionOrigin::Rubric,
            selected: true,
        }
    }

    /// A selected requirement taken from the assignment's own checklist.
    pub fn checklist(
        id: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: description.into(),
            origin: CriterionOrigin::AssignmentChecklist,
            selected: true,
        }
    }

    pub fn is_checklist(&self) -> bool {
        self.origin == CriterionOrigin::AssignmentChecklist
    }
}

/// Split the selected criteria into `(checklist, content)` preserving order.
pub fn partition(criteria: &[Criterion]) -> (Vec<&Criterion>, Vec<&Criterion>) {
    criteria
        .iter()
        .filter(|c| c.selected)
        .partition(|c| c.is_checklist())
}

/// Assignment configuration, stored per student code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentConfig {
    pub level: Niveau,
    pub assignment_text: String,
    pub criteria: Vec<Criterion>,
}

impl AssignmentConfig {
    pub fn selected_criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter().filter(|c| c.selected)
    }

    /// True when at least one criterion is selected.
    pub fn has_rubric(&self) -> bool {
        self.selected_criteria().next().is_some()
    }
}

//! Rubric master data: criteria per niveau, grouped into Inhoud, Vorm and Taal.
//!
//! The content itself is static data supplied as JSON; this module only
//! gives it a typed shape and the lookups teachers need when configuring an
//! assignment.

use serde::{Deserialize, Serialize};

use crate::{Criterion, CriterionOrigin, Niveau};

/// Top-level grouping shown to teachers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RubricGroup {
    Inhoud,
    Vorm,
    Taal,
}

const INHOUD_CATEGORIES: &[&str] = &[
    "Samenhang",
    "Afstemming op Doel",
    "Afstemming op Publiek",
    "Afstemming op Doel en Publiek",
    "Relaties en Argumentatie",
    "Woordgebruik",
    "Woordgebruik en Woordenschat",
];

const VORM_CATEGORIES: &[&str] = &["Leesbaarheid", "Alinea's en Structuur"];

const TAAL_CATEGORIES: &[&str] = &[
    "Taalverzorging",
    "Spelling en Grammatica",
    "Verwijs- en Verbindingswoorden",
];

impl RubricGroup {
    pub const ALL: [RubricGroup; 3] = [RubricGroup::Inhoud, RubricGroup::Vorm, RubricGroup::Taal];

    /// Group for a rubric category name, if it is a known one.
    pub fn for_category(category: &str) -> Option<Self> {
        if INHOUD_CATEGORIES.contains(&category) {
            Some(Self::Inhoud)
        } else if VORM_CATEGORIES.contains(&category) {
            Some(Self::Vorm)
        } else if TAAL_CATEGORIES.contains(&category) {
            Some(Self::Taal)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricEntry {
    pub id: String,
    pub label: String,
    pub description: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricSection {
    pub id: String,
    pub category: String,
    pub criteria: Vec<RubricEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricLevel {
    pub level: Niveau,
    pub level_name: String,
    pub description: String,
    pub categories: Vec<RubricSection>,
}

/// Read-only rubric lookup by niveau.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RubricCatalog {
    levels: Vec<RubricLevel>,
}

const BUILTIN: &str = include_str!("../data/rubric.json");

impl RubricCatalog {
    /// The bundled referentieniveau criteria (1F to 4F).
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Self::from_json(BUILTIN)
    }

    /// Parse the master data: a JSON array of levels.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn level(&self, niveau: Niveau) -> Option<&RubricLevel> {
        self.levels.iter().find(|l| l.level == niveau)
    }

    pub fn entries(&self, niveau: Niveau) -> impl Iterator<Item = &RubricEntry> {
        self.level(niveau)
            .into_iter()
            .flat_map(|l| l.categories.iter())
            .flat_map(|s| s.criteria.iter())
    }

    /// All criteria for a level as unselected rubric criteria, ready for the teacher to pick.
    pub fn criteria_for(&self, niveau: Niveau) -> Vec<Criterion> {
        self.entries(niveau)
            .map(|e| Criterion {
                id: e.id.clone(),
                label: e.label.clone(),
                description: e.description.clone(),
                origin: CriterionOrigin::Rubric,
                selected: false,
            })
            .collect()
    }

    /// Sections grouped into Inhoud/Vorm/Taal; empty groups and unknown categories are left out.
    pub fn grouped(&self, niveau: Niveau) -> Vec<(RubricGroup, Vec<&RubricSection>)> {
        let Some(level) = self.level(niveau) else {
            return Vec::new();
        };
        RubricGroup::ALL
            .iter()
            .map(|&group| {
                let sections = level
                    .categories
                    .iter()
                    .filter(|s| RubricGroup::for_category(&s.category) == Some(group))
                    .collect::<Vec<_>>();
                (group, sections)
            })
            .filter(|(_, sections)| !sections.is_empty())
            .collect()
    }
}

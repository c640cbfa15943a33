use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::Personality;
use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Personality table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How one persona is configured upstream and presented to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalityProfile {
    /// Upstream assistant that answers for this persona.
    pub assistant_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub sample_prompts: Vec<String>,
}

/// `[personalities.<name>]` tables keyed by persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalityTable(pub BTreeMap<Personality, PersonalityProfile>);

impl Default for PersonalityTable {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            Personality::Mentor,
            PersonalityProfile {
                assistant_id: String::new(),
                display_name: "Mentor".into(),
                sample_prompts: vec![
                    "Help me plan my week.".into(),
                    "What should I learn next?".into(),
                ],
            },
        );
        map.insert(
            Personality::Companion,
            PersonalityProfile {
                assistant_id: String::new(),
                display_name: "Companion".into(),
                sample_prompts: vec![
                    "How was your day?".into(),
                    "Tell me something fun.".into(),
                ],
            },
        );
        Self(map)
    }
}

impl PersonalityTable {
    pub fn profile(&self, personality: Personality) -> Option<&PersonalityProfile> {
        self.0.get(&personality)
    }

    /// Resolve the upstream assistant id for a persona.
    pub fn assistant_id(&self, personality: Personality) -> Result<String> {
        match self.0.get(&personality) {
            Some(p) if !p.assistant_id.is_empty() => Ok(p.assistant_id.clone()),
            _ => Err(Error::Config(format!(
                "no assistant_id configured for personality '{personality}'"
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Personality, &PersonalityProfile)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_both_personas_without_ids() {
        let table = PersonalityTable::default();
        assert!(table.profile(Personality::Mentor).is_some());
        assert!(table.profile(Personality::Companion).is_some());
        assert!(table.assistant_id(Personality::Mentor).is_err());
    }

    #[test]
    fn parses_from_toml_tables() {
        let table: PersonalityTable = toml::from_str(
            r#"
            [mentor]
            assistant_id = "asst_mentor"
            display_name = "The Mentor"

            [companion]
            assistant_id = "asst_companion"
            "#,
        )
        .unwrap();
        assert_eq!(table.assistant_id(Personality::Mentor).unwrap(), "asst_mentor");
        assert_eq!(
            table.assistant_id(Personality::Companion).unwrap(),
            "asst_companion"
        );
        assert!(table.profile(Personality::Companion).unwrap().sample_prompts.is_empty());
    }
}

//! Section kinds and the attribute templates they hand to new entities
//!
//! Templates are static configuration: each section kind knows its entity
//! label (used to name operations) and the attributes every entity gets.

use super::attribute::{Attribute, AttributeKind, AttributeValue, MergeStrategy};
use serde::{Deserialize, Serialize};

/// Closed set of section variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Characters,
    Settings,
}

impl SectionKind {
    pub const ALL: [SectionKind; 2] = [SectionKind::Characters, SectionKind::Settings];

    /// Default display name of a section of this kind.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Characters => "Characters",
            Self::Settings => "Settings",
        }
    }

    /// Singular noun used in operation names (`add_character`, ...).
    pub fn entity_label(&self) -> &'static str {
        match self {
            Self::Characters => "character",
            Self::Settings => "setting",
        }
    }

    /// Guidance for the `add_<label>` operation.
    pub fn add_entity_description(&self) -> &'static str {
        match self {
            Self::Characters => {
                "Call this with every character mentioned in the current chunk. \
                 Unnamed characters may be referred to by a title or social standing; \
                 use that instead. Existing characters are not duplicated."
            }
            Self::Settings => {
                "Call this with every setting in the current chunk. A setting is any \
                 location characters find themselves in. Existing settings are not duplicated."
            }
        }
    }

    /// The attribute template every new entity of this kind receives.
    pub fn template(&self) -> Vec<Attribute> {
        match self {
            Self::Characters => character_template(),
            Self::Settings => setting_template(),
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_name())
    }
}

fn text(
    name: &str,
    description: &str,
    update_prompt: &str,
    cadence: u32,
    merge: MergeStrategy,
) -> Attribute {
    Attribute::new(name, AttributeKind::Text, description, AttributeValue::text(""), cadence, merge)
        .with_update_prompt(update_prompt)
}

fn aliases(owner: &str) -> Attribute {
    Attribute::new(
        "aliases",
        AttributeKind::List,
        format!("A list of all known aliases of the {}.", owner),
        AttributeValue::empty_list(),
        1,
        MergeStrategy::Union,
    )
}

fn character_template() -> Vec<Attribute> {
    vec![
        text(
            "personality",
            "Markdown formatted: analysis of the character's personality.",
            "This should be a small essay of the character's personality. Analyze it from a \
             psychological and sociological perspective using the new data and the existing \
             analysis.",
            3,
            MergeStrategy::Agent,
        ),
        text(
            "trivia",
            "Markdown formatted: various interesting trivia related to the character.",
            "This should be a list of the character's various trivia. Make it as interesting \
             as possible.",
            3,
            MergeStrategy::Agent,
        ),
        aliases("character"),
        text(
            "appearance",
            "Markdown formatted: detailed physical description of the character's appearance.",
            "Provide a detailed physical description of the character. Use the new data to enrich \
             the existing description and track how the appearance changes through the story.",
            2,
            MergeStrategy::Agent,
        ),
        Attribute::new(
            "gender",
            AttributeKind::Choice(
                ["male", "female", "other", "not_given"].iter().map(|s| s.to_string()).collect(),
            ),
            "Gender of the character.",
            AttributeValue::text("not_given"),
            1,
            MergeStrategy::Latest,
        ),
        text(
            "current_state",
            "A short sentence describing the current state of the character.",
            "",
            1,
            MergeStrategy::Latest,
        ),
    ]
}

fn setting_template() -> Vec<Attribute> {
    vec![
        text(
            "description",
            "Markdown formatted: detailed description of the setting.",
            "Provide a comprehensive description of the setting, including significant \
             features, landmarks, climate and general atmosphere. Use the new data to enrich the \
             existing description.",
            3,
            MergeStrategy::Agent,
        ),
        text(
            "history",
            "Markdown formatted: historical background of the setting.",
            "Provide the historical background of the setting, including major events, changes \
             over time and influential figures.",
            1,
            MergeStrategy::Agent,
        ),
        text(
            "geography",
            "Markdown formatted: geographical features of the setting.",
            "Describe the geographical features of the setting: terrain, climate, natural \
             resources and significant landmarks.",
            1,
            MergeStrategy::Agent,
        ),
        text(
            "culture",
            "Markdown formatted: culture of the people living in the setting.",
            "Describe the culture of the setting: customs, traditions, beliefs and social \
             structure.",
            1,
            MergeStrategy::Agent,
        ),
        aliases("setting"),
    ]
}

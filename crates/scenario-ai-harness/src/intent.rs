//! Prompt intent classification and the typed payload expected for each intent.
//!
//! The same [`IntentPayload`] shapes are produced by the fallback provider and
//! used by callers to shape-check values recovered from model output.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NPC_ROSTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bgenerate\s+\d+\s+(?:[a-z-]+\s+){0,4}npcs?\b").expect("valid npc regex")
});
const OPENING_NARRATIVE_MARKER: &str = "opening story plot";
const SCENARIO_MARKER: &str = "create a management scenario";

/// What an outgoing prompt asks the model to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    /// "Generate N NPCs": an array of NPC objects.
    NpcRoster,
    /// "Opening story plot": a plot summary and opening narrative.
    OpeningNarrative,
    /// "Create a management scenario": a full scenario object.
    Scenario,
    /// Anything else: a conversational reply with KPI effects.
    Reply,
}

impl Intent {
    /// Classifies a prompt. Checks are ordered and the first match wins.
    pub fn classify(prompt: &str) -> Self {
        if NPC_ROSTER.is_match(prompt) {
            return Self::NpcRoster;
        }
        let lowered = prompt.to_lowercase();
        if lowered.contains(OPENING_NARRATIVE_MARKER) {
            Self::OpeningNarrative
        } else if lowered.contains(SCENARIO_MARKER) {
            Self::Scenario
        } else {
            Self::Reply
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NpcRoster => "npc-roster",
            Self::OpeningNarrative => "opening-narrative",
            Self::Scenario => "scenario",
            Self::Reply => "reply",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staff member in the simulated business.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub role: String,
    pub personality: String,
    pub avatar: String,
}

/// Opening plot for a new game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpeningNarrative {
    pub plot_summary: String,
    pub opening_narrative: String,
}

/// How an NPC responds to a chosen option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcReaction {
    pub npc_name: String,
    pub mood: String,
    pub dialogue: String,
}

/// One answer to a scenario question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOption {
    pub text: String,
    /// KPI name to signed delta.
    #[serde(default)]
    pub consequences: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npc_reaction: Option<NpcReaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_context: Option<String>,
}

/// Question-type specific body of a scenario.
///
/// Multiple-choice scenarios carry `options`; other question types keep their
/// fields in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioData {
    #[serde(default)]
    pub options: Vec<ScenarioOption>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A management decision presented to the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub title: String,
    pub description: String,
    #[serde(rename = "involvedNPCs", default)]
    pub involved_npcs: Vec<String>,
    pub urgency: String,
    pub question_type: String,
    pub data: ScenarioData,
}

/// Conversational reply with KPI side effects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub reply: String,
    #[serde(default)]
    pub kpi_impact: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_process: Option<String>,
}

/// Payload shape for each [`Intent`].
#[derive(Clone, Debug, PartialEq)]
pub enum IntentPayload {
    NpcRoster(Vec<Npc>),
    OpeningNarrative(OpeningNarrative),
    Scenario(Scenario),
    Reply(Reply),
}

impl IntentPayload {
    /// Shape-checks `value` against the schema for `intent`.
    pub fn decode(intent: Intent, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match intent {
            Intent::NpcRoster => Self::NpcRoster(serde_json::from_value(value)?),
            Intent::OpeningNarrative => Self::OpeningNarrative(serde_json::from_value(value)?),
            Intent::Scenario => Self::Scenario(serde_json::from_value(value)?),
            Intent::Reply => Self::Reply(serde_json::from_value(value)?),
        })
    }

    /// Returns the intent this payload answers.
    pub fn intent(&self) -> Intent {
        match self {
            Self::NpcRoster(_) => Intent::NpcRoster,
            Self::OpeningNarrative(_) => Intent::OpeningNarrative,
            Self::Scenario(_) => Intent::Scenario,
            Self::Reply(_) => Intent::Reply,
        }
    }

    /// Serializes the payload to the wire shape the model is asked to emit.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::NpcRoster(npcs) => serde_json::to_value(npcs),
            Self::OpeningNarrative(plot) => serde_json::to_value(plot),
            Self::Scenario(scenario) => serde_json::to_value(scenario),
            Self::Reply(reply) => serde_json::to_value(reply),
        }
    }
}

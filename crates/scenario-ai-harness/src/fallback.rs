//! Canned payloads used when neither transport nor parsing produced a result.
//!
//! Built once per process and shared read-only.

use once_cell::sync::Lazy;

use crate::intent::{
    Intent, IntentPayload, Npc, NpcReaction, OpeningNarrative, Reply, Scenario, ScenarioData,
    ScenarioOption,
};

/// User-visible notice shown the first time a session switches to canned content.
pub const OFFLINE_NOTICE: &str = "Network Issue: Switched to Offline Simulation Mode.";

struct FallbackEntry {
    payload: IntentPayload,
    value: serde_json::Value,
    text: String,
}

impl FallbackEntry {
    fn new(payload: IntentPayload) -> Self {
        let value = payload
            .to_value()
            .expect("fallback payloads are plain data and always serialize");
        let text = value.to_string();
        Self {
            payload,
            value,
            text,
        }
    }
}

struct FallbackSet {
    npc_roster: FallbackEntry,
    opening_narrative: FallbackEntry,
    scenario: FallbackEntry,
    reply: FallbackEntry,
}

impl FallbackSet {
    fn entry(&self, intent: Intent) -> &FallbackEntry {
        match intent {
            Intent::NpcRoster => &self.npc_roster,
            Intent::OpeningNarrative => &self.opening_narrative,
            Intent::Scenario => &self.scenario,
            Intent::Reply => &self.reply,
        }
    }
}

static FALLBACKS: Lazy<FallbackSet> = Lazy::new(|| FallbackSet {
    npc_roster: FallbackEntry::new(IntentPayload::NpcRoster(vec![
        npc("n1", "Mock Manager", "Manager", "Stoic", "👔"),
        npc("n2", "Mock Chef", "Head Chef", "Angry", "👨‍🍳"),
    ])),
    opening_narrative: FallbackEntry::new(IntentPayload::OpeningNarrative(OpeningNarrative {
        plot_summary: "Network Offline: You are managing the store in manual mode.".into(),
        opening_narrative: "The AI servers are currently unreachable. You must rely on your own \
                            instincts to run this restaurant. Good luck!"
            .into(),
    })),
    scenario: FallbackEntry::new(IntentPayload::Scenario(Scenario {
        title: "Network Outage".into(),
        description: "Communication systems are down. You need to make a decision without \
                      external data."
            .into(),
        involved_npcs: Vec::new(),
        urgency: "high".into(),
        question_type: "multiple-choice".into(),
        data: ScenarioData {
            options: vec![
                option(
                    "Focus on Staff Morale",
                    "staffMorale",
                    "Understood.",
                    "Staff is reassured.",
                ),
                option(
                    "Focus on Efficiency",
                    "efficiency",
                    "Speed is key.",
                    "Operations are faster.",
                ),
            ],
            extra: serde_json::Map::new(),
        },
    })),
    reply: FallbackEntry::new(IntentPayload::Reply(Reply {
        reply: "I cannot connect to the AI brain right now. Please check your connection.".into(),
        kpi_impact: serde_json::Map::new(),
        thought_process: Some("Offline mode".into()),
    })),
});

fn npc(id: &str, name: &str, role: &str, personality: &str, avatar: &str) -> Npc {
    Npc {
        id: id.into(),
        name: name.into(),
        role: role.into(),
        personality: personality.into(),
        avatar: avatar.into(),
    }
}

fn option(text: &str, kpi: &str, dialogue: &str, future_context: &str) -> ScenarioOption {
    let mut consequences = serde_json::Map::new();
    consequences.insert(kpi.into(), serde_json::Value::from(5));
    ScenarioOption {
        text: text.into(),
        consequences,
        npc_reaction: Some(NpcReaction {
            npc_name: "System".into(),
            mood: "neutral".into(),
            dialogue: dialogue.into(),
        }),
        future_context: Some(future_context.into()),
    }
}

/// Returns the canned payload for `intent`.
pub fn fallback_payload(intent: Intent) -> &'static IntentPayload {
    &FALLBACKS.entry(intent).payload
}

/// Returns the canned payload for `intent` serialized as JSON text.
pub fn fallback_text(intent: Intent) -> &'static str {
    &FALLBACKS.entry(intent).text
}

/// Classifies `last_message` and returns the matching canned value. Never fails.
pub fn provide_fallback(last_message: &str) -> serde_json::Value {
    FALLBACKS.entry(Intent::classify(last_message)).value.clone()
}

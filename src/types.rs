// Wire-level type definitions shared across the engine and the transport layer

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    PhilosophyDebate,
    DevilsAdvocate,
    ConsensusLab,
}

impl ConversationMode {
    pub fn label(&self) -> &'static str {
        match self {
            ConversationMode::PhilosophyDebate => "philosophy debate",
            ConversationMode::DevilsAdvocate => "devil's advocate",
            ConversationMode::ConsensusLab => "consensus lab",
        }
    }

    /// Short stance text injected into prompts and character profiles.
    pub fn stance(&self) -> &'static str {
        match self {
            ConversationMode::PhilosophyDebate => {
                "probe the principles behind every claim and name the values in tension"
            }
            ConversationMode::DevilsAdvocate => {
                "stress-test the emerging consensus by arguing the strongest opposing case"
            }
            ConversationMode::ConsensusLab => {
                "search for common ground and translate disagreements into shared criteria"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Facilitator,
    Character,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
}

/// One simulated participant bound to a model and a generated character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub agent_id: String,
    pub model: String,
    pub display_name: String,
    pub role_type: RoleType,
    pub character_profile: String,
    // Derived from role/config; regenerated on change, never sent to observers.
    #[serde(skip_serializing, default)]
    pub persona_prompt: String,
}

/// Append-only conversation entry. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub speaker_id: String,
    pub content: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(
        role: MessageRole,
        speaker_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ChatMessage {
            role,
            speaker_id: speaker_id.into(),
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Requesting,
    Completed,
    Failed,
}

/// Observational record of one generation attempt. Never read by scheduling logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLog {
    pub round_index: u32,
    pub model: String,
    pub display_name: String,
    pub act: String,
    pub status: GenerationStatus,
    pub detail: String,
    pub timestamp: String,
}

/// Per-agent edit applied through the setup operation.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleUpdate {
    pub agent_id: String,
    #[serde(default)]
    pub role_type: Option<RoleType>,
    #[serde(default)]
    pub character_profile: Option<String>,
}

/// Room configuration view returned by management operations.
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub room_id: String,
    pub subject: String,
    pub conversation_mode: ConversationMode,
    pub global_instruction: String,
    pub turn_interval_seconds: f64,
    pub agents: Vec<AgentSpec>,
}

// Generation client seam
//
// The turn loop talks to text generation through this trait only. Retry and
// failure-threshold policy live in the loop, never in implementations.

use anyhow::Result;

use crate::types::{ChatMessage, ConversationMode, RoleType};

/// Full per-turn context handed to a generation backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub display_name: String,
    pub role_type: RoleType,
    pub subject: String,
    pub conversation_mode: ConversationMode,
    pub global_instruction: String,
    pub act_name: String,
    pub act_goal: String,
    pub persona_prompt: String,
    pub history: Vec<ChatMessage>,
    pub priority_message: Option<ChatMessage>,
}

#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    /// Produce one reply for the given speaker, or fail with a generation
    /// error (network failure, non-success response, empty content).
    /// Implementations must carry a bounded timeout.
    async fn generate_reply(&self, request: &GenerationRequest) -> Result<String>;
}

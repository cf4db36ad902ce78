pub mod groq;
pub mod ollama;
pub mod turn;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{CallState, Company, ProspectDetails, TranscriptTurn, TurnReply};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Raw chat-completion boundary. Implementations are interchangeable;
/// selection happens at startup via config.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String>;
}

/// Everything the dialogue service needs to produce the next turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub company: Company,
    pub state: CallState,
    pub transcript: Vec<TranscriptTurn>,
    /// Human-readable summary of the company's recurring windows, so the
    /// model can speak about availability in general terms. Concrete slots
    /// only ever come from `offered`.
    pub availability: String,
    /// Slot options currently on the table, already formatted for speech,
    /// in offer order ("option 1" is index 0).
    pub offered: Vec<String>,
    pub prospect: ProspectDetails,
}

/// Boundary to the dialogue-generation service. The core owns this
/// contract, not the generation: given the conversation so far, return the
/// next utterance plus a structured signal. Callers bound the latency with
/// a timeout and fall back to a scripted line when it is exceeded.
#[async_trait]
pub trait TurnAdapter: Send + Sync {
    async fn next_turn(&self, ctx: &TurnContext) -> anyhow::Result<TurnReply>;
}

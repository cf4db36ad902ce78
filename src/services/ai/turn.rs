use serde::Deserialize;

use crate::models::{TurnReply, TurnRole, TurnSignal};
use crate::services::ai::{LlmProvider, Message, TurnAdapter, TurnContext};

const SYSTEM_PROMPT: &str = r#"You are the voice of an outbound sales call whose single goal is to book a meeting with the prospect. Keep every turn to one or two short, natural spoken sentences. Ask one question at a time. Never invent facts beyond the company profile. Respect opt-outs immediately.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "signal": "continue|wants_times|selects_option|confirms|declines|end_call",
  "option": 1,
  "utterance": "What you say next to the prospect",
  "prospect_name": "extracted name or null",
  "prospect_contact": "extracted email/phone or null"
}

Signal rules:
- "continue": the conversation should keep going (questions, objections, small talk)
- "wants_times": the prospect is interested in a meeting and wants to hear available times
- "selects_option": the prospect picked one of the offered time options; set "option" to its 1-based number
- "confirms": the prospect agrees to the time that was just proposed
- "declines": the prospect rejects the pitch or the proposed time
- "end_call": the prospect asked to stop, or the conversation is naturally over

When time options are listed in the context, map natural phrases like "the second one" or a spoken day/time back to the matching option number."#;

/// Production adapter: wraps an LLM provider and enforces the structured
/// signal contract on its free-form output.
pub struct LlmTurnAdapter {
    llm: Box<dyn LlmProvider>,
}

impl LlmTurnAdapter {
    pub fn new(llm: Box<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl TurnAdapter for LlmTurnAdapter {
    async fn next_turn(&self, ctx: &TurnContext) -> anyhow::Result<TurnReply> {
        let messages: Vec<Message> = ctx
            .transcript
            .iter()
            .filter_map(|t| {
                let role = match t.role {
                    TurnRole::Prospect => "user",
                    TurnRole::Agent => "assistant",
                    TurnRole::System => return None,
                };
                Some(Message {
                    role: role.to_string(),
                    content: t.content.clone(),
                })
            })
            .collect();

        let system = build_system_prompt(ctx);
        let response = self.llm.chat(&system, &messages).await?;

        Ok(parse_turn_reply(&response))
    }
}

fn build_system_prompt(ctx: &TurnContext) -> String {
    let mut prompt = format!(
        "{SYSTEM_PROMPT}\n\nYou are {agent}, calling on behalf of {company}.\nCompany profile:\n{profile}\n\nConversation stage: {stage}",
        agent = ctx.company.agent_name,
        company = ctx.company.name,
        profile = if ctx.company.description.is_empty() {
            "(no profile provided)"
        } else {
            ctx.company.description.as_str()
        },
        stage = ctx.state.as_str(),
    );

    if !ctx.availability.is_empty() {
        prompt.push_str(&format!("\n\nGeneral availability: {}", ctx.availability));
    }

    if !ctx.offered.is_empty() {
        prompt.push_str("\n\nTime options currently offered:");
        for (i, option) in ctx.offered.iter().enumerate() {
            prompt.push_str(&format!("\n  option {}: {}", i + 1, option));
        }
    }

    if let Some(name) = &ctx.prospect.name {
        prompt.push_str(&format!("\n\nProspect name on file: {name}"));
    }

    prompt
}

#[derive(Deserialize)]
struct RawTurnReply {
    signal: String,
    #[serde(default)]
    option: Option<usize>,
    #[serde(default)]
    utterance: String,
    #[serde(default)]
    prospect_name: Option<String>,
    #[serde(default)]
    prospect_contact: Option<String>,
}

/// Parse the provider's output into a turn reply. Unparseable payloads are
/// not an error: the raw text is spoken with a `Continue` signal so the
/// call keeps moving.
pub fn parse_turn_reply(response: &str) -> TurnReply {
    if let Some(reply) = try_parse(response) {
        return reply;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Some(reply) = try_parse(cleaned) {
        return reply;
    }

    // Last resort: find a JSON object embedded in surrounding prose
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Some(reply) = try_parse(&cleaned[start..=end]) {
                return reply;
            }
        }
    }

    tracing::warn!("failed to parse turn reply as signal JSON, treating as continue");
    TurnReply::fallback(response.trim())
}

fn try_parse(s: &str) -> Option<TurnReply> {
    let raw: RawTurnReply = serde_json::from_str(s).ok()?;
    let signal = match raw.signal.as_str() {
        "continue" => TurnSignal::Continue,
        "wants_times" => TurnSignal::WantsTimes,
        "selects_option" => match raw.option {
            Some(i) => TurnSignal::SelectsOption(i),
            // Signal without an index is malformed; keep talking.
            None => TurnSignal::Continue,
        },
        "confirms" => TurnSignal::Confirms,
        "declines" => TurnSignal::Declines,
        "end_call" => TurnSignal::EndCall,
        _ => TurnSignal::Continue,
    };

    Some(TurnReply {
        utterance: raw.utterance,
        signal,
        prospect_name: raw.prospect_name,
        prospect_contact: raw.prospect_contact,
    })
}

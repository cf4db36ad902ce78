use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ProspectDetails;
use crate::services::slots::Slot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Greeting,
    Pitching,
    AwaitingInterest,
    OfferingSlots,
    AwaitingConfirmation,
    Booked,
    Ended,
    Declined,
    Failed,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Greeting => "greeting",
            CallState::Pitching => "pitching",
            CallState::AwaitingInterest => "awaiting_interest",
            CallState::OfferingSlots => "offering_slots",
            CallState::AwaitingConfirmation => "awaiting_confirmation",
            CallState::Booked => "booked",
            CallState::Ended => "ended",
            CallState::Declined => "declined",
            CallState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Booked | CallState::Ended | CallState::Declined | CallState::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Prospect,
    Agent,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: TurnRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// What the state machine hands back to the telephony layer for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReply {
    pub say: String,
    pub end_call: bool,
}

/// In-memory state for one active call. Owned by the session registry;
/// a processing task holds the session lock for the duration of a turn.
#[derive(Debug)]
pub struct CallSession {
    pub call_id: String,
    pub company_id: String,
    pub state: CallState,
    pub transcript: Vec<TranscriptTurn>,
    /// Candidate slots currently on the table, referenced by 1-based index.
    pub offered: Vec<Slot>,
    /// How far into the full slot list the current offer batch starts.
    pub offer_cursor: usize,
    pub chosen: Option<Slot>,
    pub prospect: ProspectDetails,
    /// Highest turn sequence number processed so far; replays at or below
    /// this return `last_reply` without touching state.
    pub last_seq: i64,
    pub last_reply: Option<EngineReply>,
    pub adapter_failures: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl CallSession {
    pub fn new(call_id: &str, company_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            call_id: call_id.to_string(),
            company_id: company_id.to_string(),
            state: CallState::Greeting,
            transcript: vec![],
            offered: vec![],
            offer_cursor: 0,
            chosen: None,
            prospect: ProspectDetails::default(),
            last_seq: 0,
            last_reply: None,
            adapter_failures: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn record(&mut self, role: TurnRole, content: &str, now: DateTime<Utc>) {
        self.transcript.push(TranscriptTurn {
            role,
            content: content.to_string(),
            at: now,
        });
    }

    pub fn transition(&mut self, to: CallState, now: DateTime<Utc>) {
        if self.state != to {
            let note = format!("state: {} -> {}", self.state.as_str(), to.as_str());
            self.record(TurnRole::System, &note, now);
            self.state = to;
        }
    }
}

use serde::{Deserialize, Serialize};

/// Structured outcome of one adapter turn. The signal drives the state
/// machine; the utterance is what gets spoken (except where the flow
/// substitutes a scripted line, e.g. when listing concrete slot options).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnSignal {
    Continue,
    WantsTimes,
    SelectsOption(usize),
    Confirms,
    Declines,
    EndCall,
}

impl TurnSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnSignal::Continue => "continue",
            TurnSignal::WantsTimes => "wants_times",
            TurnSignal::SelectsOption(_) => "selects_option",
            TurnSignal::Confirms => "confirms",
            TurnSignal::Declines => "declines",
            TurnSignal::EndCall => "end_call",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnReply {
    pub utterance: String,
    pub signal: TurnSignal,
    pub prospect_name: Option<String>,
    pub prospect_contact: Option<String>,
}

impl TurnReply {
    pub fn fallback(utterance: &str) -> Self {
        Self {
            utterance: utterance.to_string(),
            signal: TurnSignal::Continue,
            prospect_name: None,
            prospect_contact: None,
        }
    }
}

/// Details extracted from the conversation so far, accumulated across turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProspectDetails {
    pub name: Option<String>,
    pub contact: Option<String>,
}

impl ProspectDetails {
    pub fn merge(&mut self, name: Option<String>, contact: Option<String>) {
        if name.is_some() {
            self.name = name;
        }
        if contact.is_some() {
            self.contact = contact;
        }
    }
}

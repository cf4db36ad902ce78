use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::ai::TurnAdapter;
use crate::services::ledger::MeetingLedger;
use crate::services::registry::SessionRegistry;
use crate::services::telephony::VoiceProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub turns: Box<dyn TurnAdapter>,
    pub telephony: Box<dyn VoiceProvider>,
    pub ledger: MeetingLedger,
    pub sessions: SessionRegistry,
}

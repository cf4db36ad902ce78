use serde::{Deserialize, Serialize};

/// Pitch profile presented to prospects and fed into the turn adapter's
/// system prompt. Single-tenant deployments use the `default` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent_name: String,
    pub timezone: String,
}

impl Company {
    pub fn fallback(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "our company".to_string(),
            description: String::new(),
            agent_name: "Alice".to_string(),
            timezone: "UTC".to_string(),
        }
    }

    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

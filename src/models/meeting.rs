use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub company_id: String,
    pub prospect_name: Option<String>,
    pub prospect_contact: Option<String>,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: MeetingStatus,
    pub call_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meeting {
    pub fn end_at(&self) -> DateTime<Utc> {
        self.start_at + Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Booked,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Booked => "booked",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => MeetingStatus::Cancelled,
            _ => MeetingStatus::Booked,
        }
    }
}

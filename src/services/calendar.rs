use crate::models::Meeting;

pub fn generate_ics(meeting: &Meeting, company_name: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Outdial//Call Agent//EN\r\n\
         {}\
         END:VCALENDAR\r\n",
        event_block(meeting, company_name)
    )
}

/// Feed of all booked meetings for the reporting view.
pub fn generate_feed(meetings: &[Meeting], company_name: &str) -> String {
    let events: String = meetings
        .iter()
        .map(|m| event_block(m, company_name))
        .collect();

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Outdial//Call Agent//EN\r\n\
         {events}\
         END:VCALENDAR\r\n"
    )
}

fn event_block(meeting: &Meeting, company_name: &str) -> String {
    let dtstart = meeting.start_at.format("%Y%m%dT%H%M%SZ").to_string();
    let dtend = meeting.end_at().format("%Y%m%dT%H%M%SZ").to_string();
    let dtstamp = meeting.created_at.format("%Y%m%dT%H%M%SZ").to_string();
    let uid = format!("{}@outdial", meeting.id);

    let summary = format!(
        "Meeting with {}",
        meeting.prospect_name.as_deref().unwrap_or("prospect")
    );
    let description = format!(
        "Booked by {} outreach call. Contact: {}",
        company_name,
        meeting.prospect_contact.as_deref().unwrap_or("unknown")
    );

    format!(
        "BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeetingStatus;

    fn meeting() -> Meeting {
        let start = chrono::NaiveDateTime::parse_from_str("2025-06-16 09:00", "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc();
        Meeting {
            id: "test-123".to_string(),
            company_id: "acme".to_string(),
            prospect_name: Some("Dana".to_string()),
            prospect_contact: Some("dana@example.com".to_string()),
            start_at: start,
            duration_minutes: 30,
            status: MeetingStatus::Booked,
            call_id: Some("CA1".to_string()),
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_generate_ics() {
        let ics = generate_ics(&meeting(), "Acme");
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("DTSTART:20250616T090000Z"));
        assert!(ics.contains("DTEND:20250616T093000Z"));
        assert!(ics.contains("SUMMARY:Meeting with Dana"));
        assert!(ics.contains("UID:test-123@outdial"));
        assert!(ics.contains("END:VCALENDAR"));
    }

    #[test]
    fn test_generate_feed_multiple_events() {
        let feed = generate_feed(&[meeting(), meeting()], "Acme");
        assert_eq!(feed.matches("BEGIN:VEVENT").count(), 2);
        assert_eq!(feed.matches("BEGIN:VCALENDAR").count(), 1);
    }

    #[test]
    fn test_missing_prospect_fields() {
        let mut m = meeting();
        m.prospect_name = None;
        m.prospect_contact = None;
        let ics = generate_ics(&m, "Acme");
        assert!(ics.contains("SUMMARY:Meeting with prospect"));
        assert!(ics.contains("Contact: unknown"));
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Meeting, MeetingStatus, ProspectDetails};
use crate::services::slots::Slot;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("slot is no longer available")]
    SlotConflict,

    #[error("meeting store unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative store of committed meetings.
///
/// `try_book` is the single serialization point: commits for one company
/// run under that company's async lock and re-validate overlap against the
/// live table, so a slot computed from a stale snapshot can never
/// double-book. Unrelated companies never contend on the same lock.
pub struct MeetingLedger {
    db: Arc<Mutex<Connection>>,
    company_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MeetingLedger {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            company_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, company_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.company_locks.lock().unwrap();
        locks
            .entry(company_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub async fn try_book(
        &self,
        company_id: &str,
        slot: &Slot,
        prospect: &ProspectDetails,
        call_id: Option<&str>,
    ) -> Result<Meeting, LedgerError> {
        let company_lock = self.lock_for(company_id);
        let _guard = company_lock.lock().await;

        let now = Utc::now();
        let meeting = Meeting {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            prospect_name: prospect.name.clone(),
            prospect_contact: prospect.contact.clone(),
            start_at: slot.start,
            duration_minutes: slot.duration_minutes,
            status: MeetingStatus::Booked,
            call_id: call_id.map(|s| s.to_string()),
            created_at: now,
            updated_at: now,
        };

        let db = self.db.lock().unwrap();

        // Commit-time re-validation: the offer may be minutes old.
        let booked = queries::booked_meetings(&db, company_id)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        if booked
            .iter()
            .any(|m| slot.overlaps(m.start_at, m.end_at()))
        {
            return Err(LedgerError::SlotConflict);
        }

        queries::insert_meeting(&db, &meeting)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        tracing::info!(
            company = company_id,
            meeting_id = %meeting.id,
            start = %meeting.start_at,
            "meeting booked"
        );
        Ok(meeting)
    }

    /// Snapshot of booked meetings for slot computation. Unsynchronized by
    /// design; `try_book` is the conflict authority.
    pub fn booked(&self, company_id: &str) -> Result<Vec<Meeting>, LedgerError> {
        let db = self.db.lock().unwrap();
        queries::booked_meetings(&db, company_id).map_err(|e| LedgerError::Unavailable(e.to_string()))
    }

    pub fn list(
        &self,
        company_id: &str,
        status_filter: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Meeting>, LedgerError> {
        let db = self.db.lock().unwrap();
        queries::list_meetings(&db, company_id, status_filter, limit)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }

    pub fn get(&self, meeting_id: &str) -> Result<Option<Meeting>, LedgerError> {
        let db = self.db.lock().unwrap();
        queries::get_meeting_by_id(&db, meeting_id)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }

    /// Cancelling an unknown or already-cancelled meeting is a no-op success.
    pub fn cancel(&self, meeting_id: &str) -> Result<(), LedgerError> {
        let db = self.db.lock().unwrap();
        queries::cancel_meeting(&db, meeting_id)
            .map(|_| ())
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }

    pub fn clear_all(&self, company_id: &str) -> Result<usize, LedgerError> {
        let db = self.db.lock().unwrap();
        queries::clear_meetings(&db, company_id).map_err(|e| LedgerError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn ledger() -> MeetingLedger {
        let conn = db::init_db(":memory:").unwrap();
        MeetingLedger::new(Arc::new(Mutex::new(conn)))
    }

    fn slot(start: &str) -> Slot {
        Slot {
            start: chrono::NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M")
                .unwrap()
                .and_utc(),
            duration_minutes: 30,
        }
    }

    fn prospect() -> ProspectDetails {
        ProspectDetails {
            name: Some("Dana".to_string()),
            contact: Some("dana@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn test_book_then_conflict() {
        let ledger = ledger();
        let first = ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), Some("CA1"))
            .await
            .unwrap();
        assert_eq!(first.start_at, slot("2025-06-16 09:00").start);

        let second = ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), Some("CA2"))
            .await;
        assert!(matches!(second, Err(LedgerError::SlotConflict)));
    }

    #[tokio::test]
    async fn test_overlapping_slot_conflicts() {
        let ledger = ledger();
        ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .unwrap();

        // 09:15 overlaps 09:00-09:30 even though starts differ.
        let result = ledger
            .try_book("acme", &slot("2025-06-16 09:15"), &prospect(), None)
            .await;
        assert!(matches!(result, Err(LedgerError::SlotConflict)));
    }

    #[tokio::test]
    async fn test_adjacent_slot_books() {
        let ledger = ledger();
        ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .unwrap();
        assert!(ledger
            .try_book("acme", &slot("2025-06-16 09:30"), &prospect(), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_other_company_not_blocked() {
        let ledger = ledger();
        ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .unwrap();
        assert!(ledger
            .try_book("globex", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let ledger = ledger();
        let meeting = ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .unwrap();
        ledger.cancel(&meeting.id).unwrap();
        assert!(ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let ledger = ledger();
        let meeting = ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .unwrap();
        assert!(ledger.cancel(&meeting.id).is_ok());
        assert!(ledger.cancel(&meeting.id).is_ok());
        assert!(ledger.cancel("no-such-meeting").is_ok());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let ledger = ledger();
        ledger
            .try_book("acme", &slot("2025-06-16 09:00"), &prospect(), None)
            .await
            .unwrap();
        ledger
            .try_book("acme", &slot("2025-06-16 10:00"), &prospect(), None)
            .await
            .unwrap();
        assert_eq!(ledger.clear_all("acme").unwrap(), 2);
        assert!(ledger.booked("acme").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_booking_exactly_one_wins() {
        let ledger = Arc::new(ledger());
        let slot_a = slot("2025-06-16 09:00");

        let mut handles = vec![];
        for i in 0..2 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .try_book("acme", &slot_a, &ProspectDetails::default(), Some(&format!("CA{i}")))
                    .await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(LedgerError::SlotConflict) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
    }
}

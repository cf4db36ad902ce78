use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{AvailabilityWindow, Company, Meeting, MeetingStatus};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|n| n.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

// ── Companies ──

pub fn get_company(conn: &Connection, id: &str) -> anyhow::Result<Option<Company>> {
    let result = conn.query_row(
        "SELECT id, name, description, agent_name, timezone FROM companies WHERE id = ?1",
        params![id],
        |row| {
            Ok(Company {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                agent_name: row.get(3)?,
                timezone: row.get(4)?,
            })
        },
    );

    match result {
        Ok(company) => Ok(Some(company)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_company(conn: &Connection, company: &Company) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO companies (id, name, description, agent_name, timezone)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           description = excluded.description,
           agent_name = excluded.agent_name,
           timezone = excluded.timezone",
        params![
            company.id,
            company.name,
            company.description,
            company.agent_name,
            company.timezone,
        ],
    )?;
    Ok(())
}

// ── Availability windows ──

pub fn list_windows(conn: &Connection, company_id: &str) -> anyhow::Result<Vec<AvailabilityWindow>> {
    let mut stmt = conn.prepare(
        "SELECT company_id, weekday, start_time, end_time, timezone, position
         FROM availability_windows WHERE company_id = ?1 ORDER BY position ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![company_id], |row| {
        Ok(AvailabilityWindow {
            company_id: row.get(0)?,
            weekday: row.get(1)?,
            start: row.get(2)?,
            end: row.get(3)?,
            timezone: row.get(4)?,
            position: row.get(5)?,
        })
    })?;

    let mut windows = vec![];
    for row in rows {
        windows.push(row?);
    }
    Ok(windows)
}

/// Replace the whole window set for a company in one transaction.
pub fn replace_windows(
    conn: &mut Connection,
    company_id: &str,
    windows: &[AvailabilityWindow],
) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM availability_windows WHERE company_id = ?1",
        params![company_id],
    )?;
    for (position, w) in windows.iter().enumerate() {
        tx.execute(
            "INSERT INTO availability_windows (company_id, weekday, start_time, end_time, timezone, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![company_id, w.weekday, w.start, w.end, w.timezone, position as i64],
        )?;
    }
    tx.commit()?;
    Ok(())
}

// ── Meetings ──

pub fn insert_meeting(conn: &Connection, meeting: &Meeting) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO meetings (id, company_id, prospect_name, prospect_contact, start_at, duration_minutes, status, call_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            meeting.id,
            meeting.company_id,
            meeting.prospect_name,
            meeting.prospect_contact,
            format_ts(&meeting.start_at),
            meeting.duration_minutes,
            meeting.status.as_str(),
            meeting.call_id,
            format_ts(&meeting.created_at),
            format_ts(&meeting.updated_at),
        ],
    )?;
    Ok(())
}

pub fn booked_meetings(conn: &Connection, company_id: &str) -> anyhow::Result<Vec<Meeting>> {
    let mut stmt = conn.prepare(
        "SELECT id, company_id, prospect_name, prospect_contact, start_at, duration_minutes, status, call_id, created_at, updated_at
         FROM meetings WHERE company_id = ?1 AND status = 'booked' ORDER BY start_at ASC",
    )?;

    let rows = stmt.query_map(params![company_id], |row| Ok(parse_meeting_row(row)))?;

    let mut meetings = vec![];
    for row in rows {
        meetings.push(row??);
    }
    Ok(meetings)
}

pub fn list_meetings(
    conn: &Connection,
    company_id: &str,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Meeting>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            "SELECT id, company_id, prospect_name, prospect_contact, start_at, duration_minutes, status, call_id, created_at, updated_at \
             FROM meetings WHERE company_id = ?1 AND status = ?2 ORDER BY start_at ASC LIMIT ?3"
                .to_string(),
            vec![
                Box::new(company_id.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(status.to_string()),
                Box::new(limit),
            ],
        ),
        None => (
            "SELECT id, company_id, prospect_name, prospect_contact, start_at, duration_minutes, status, call_id, created_at, updated_at \
             FROM meetings WHERE company_id = ?1 ORDER BY start_at ASC LIMIT ?2"
                .to_string(),
            vec![
                Box::new(company_id.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_meeting_row(row)))?;

    let mut meetings = vec![];
    for row in rows {
        meetings.push(row??);
    }
    Ok(meetings)
}

pub fn get_meeting_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Meeting>> {
    let result = conn.query_row(
        "SELECT id, company_id, prospect_name, prospect_contact, start_at, duration_minutes, status, call_id, created_at, updated_at \
         FROM meetings WHERE id = ?1",
        params![id],
        |row| Ok(parse_meeting_row(row)),
    );

    match result {
        Ok(meeting) => Ok(Some(meeting?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Returns the number of rows flipped to cancelled (0 when the meeting is
/// unknown or already cancelled; callers treat both as success).
pub fn cancel_meeting(conn: &Connection, id: &str) -> anyhow::Result<usize> {
    let now = format_ts(&Utc::now());
    let count = conn.execute(
        "UPDATE meetings SET status = 'cancelled', updated_at = ?1 WHERE id = ?2 AND status = 'booked'",
        params![now, id],
    )?;
    Ok(count)
}

pub fn clear_meetings(conn: &Connection, company_id: &str) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM meetings WHERE company_id = ?1",
        params![company_id],
    )?;
    Ok(count)
}

pub fn upcoming_meeting_count(conn: &Connection, company_id: &str) -> anyhow::Result<i64> {
    let now = format_ts(&Utc::now());
    let count = conn.query_row(
        "SELECT COUNT(*) FROM meetings WHERE company_id = ?1 AND status = 'booked' AND start_at > ?2",
        params![company_id, now],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_meeting_row(row: &rusqlite::Row) -> anyhow::Result<Meeting> {
    let id: String = row.get(0)?;
    let company_id: String = row.get(1)?;
    let prospect_name: Option<String> = row.get(2)?;
    let prospect_contact: Option<String> = row.get(3)?;
    let start_at_str: String = row.get(4)?;
    let duration_minutes: i64 = row.get(5)?;
    let status_str: String = row.get(6)?;
    let call_id: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Meeting {
        id,
        company_id,
        prospect_name,
        prospect_contact,
        start_at: parse_ts(&start_at_str),
        duration_minutes,
        status: MeetingStatus::parse(&status_str),
        call_id,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One recurring weekly window in which a company takes meetings.
///
/// Times are local to `timezone`; the slot calculator converts to UTC.
/// Windows for the same company may overlap; their union is offered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityWindow {
    pub company_id: String,
    pub weekday: String,
    pub start: String,
    pub end: String,
    pub timezone: String,
    #[serde(default)]
    pub position: i64,
}

impl AvailabilityWindow {
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_weekday(&self.weekday)?;
        let start = parse_time(&self.start)?;
        let end = parse_time(&self.end)?;
        if start >= end {
            anyhow::bail!("window start must be before end: {} >= {}", self.start, self.end);
        }
        self.tz()?;
        Ok(())
    }

    pub fn day(&self) -> anyhow::Result<Weekday> {
        parse_weekday(&self.weekday)
    }

    pub fn start_time(&self) -> anyhow::Result<NaiveTime> {
        parse_time(&self.start)
    }

    pub fn end_time(&self) -> anyhow::Result<NaiveTime> {
        parse_time(&self.end)
    }

    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timezone: {}", self.timezone))
    }

    pub fn to_human_readable(&self) -> String {
        format!(
            "{}: {}-{} ({})",
            capitalize(&self.weekday),
            self.start,
            self.end,
            self.timezone
        )
    }
}

pub fn summarize(windows: &[AvailabilityWindow]) -> String {
    if windows.is_empty() {
        return "No preset windows".to_string();
    }

    let day_order = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
    let mut sorted = windows.to_vec();
    sorted.sort_by_key(|w| {
        day_order
            .iter()
            .position(|d| *d == w.weekday.to_lowercase())
            .unwrap_or(7)
    });

    sorted
        .iter()
        .map(|w| w.to_human_readable())
        .collect::<Vec<_>>()
        .join(", ")
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

pub fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| anyhow::anyhow!("invalid time format: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(day: &str, start: &str, end: &str) -> AvailabilityWindow {
        AvailabilityWindow {
            company_id: "default".to_string(),
            weekday: day.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            timezone: "UTC".to_string(),
            position: 0,
        }
    }

    #[test]
    fn test_valid_window() {
        assert!(window("mon", "09:00", "17:00").validate().is_ok());
    }

    #[test]
    fn test_invalid_day() {
        assert!(window("xyz", "09:00", "17:00").validate().is_err());
    }

    #[test]
    fn test_invalid_time() {
        assert!(window("mon", "25:00", "17:00").validate().is_err());
    }

    #[test]
    fn test_start_after_end() {
        assert!(window("mon", "17:00", "09:00").validate().is_err());
        assert!(window("mon", "09:00", "09:00").validate().is_err());
    }

    #[test]
    fn test_invalid_timezone() {
        let mut w = window("mon", "09:00", "17:00");
        w.timezone = "Mars/Olympus".to_string();
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_summarize_orders_by_day() {
        let windows = vec![window("fri", "10:00", "16:00"), window("mon", "09:00", "17:00")];
        let readable = summarize(&windows);
        assert_eq!(
            readable,
            "Mon: 09:00-17:00 (UTC), Fri: 10:00-16:00 (UTC)"
        );
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), "No preset windows");
    }
}

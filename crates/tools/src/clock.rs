//! Clock tool: the current date and time.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use daisy_core::error::ToolError;
use daisy_core::tool::Tool;
use tokio_util::sync::CancellationToken;

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "Clock"
    }

    fn description(&self) -> &str {
        "The current date and time, locally, in UTC, or at a fixed UTC offset."
    }

    fn argument_format(&self) -> &str {
        "<local | UTC | offset such as +05:30>"
    }

    fn examples(&self) -> &[&str] {
        &[
            "what time is it",
            "what's today's date",
            "what day of the week is it",
            "tell me the time in UTC",
            "what's the date today",
        ]
    }

    async fn execute(&self, argument: &str, cancel: &CancellationToken) -> Result<String, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled(self.name().into()));
        }
        describe(argument, Utc::now())
    }
}

/// Render `now` in the zone named by `argument`.
fn describe(argument: &str, now: DateTime<Utc>) -> Result<String, ToolError> {
    let zone = argument.trim();
    match zone.to_ascii_lowercase().as_str() {
        "" | "local" | "here" => Ok(render(&now.with_timezone(&Local), "local time")),
        "utc" | "gmt" | "z" => Ok(render(&now, "UTC")),
        _ => {
            let offset = parse_offset(zone).ok_or_else(|| {
                ToolError::InvalidArguments(format!("unrecognised time zone '{zone}'"))
            })?;
            Ok(render(&offset.from_utc_datetime(&now.naive_utc()), &format!("UTC{offset}")))
        }
    }
}

fn render<Tz: TimeZone>(at: &DateTime<Tz>, label: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("It is {} on {} ({label}).", at.format("%H:%M"), at.format("%A, %-d %B %Y"))
}

/// `+05:30`, `-8`, `UTC+2`
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s
        .trim_start_matches("UTC")
        .trim_start_matches("utc")
        .trim_start_matches("GMT")
        .trim_start_matches("gmt")
        .trim();
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn utc() {
        assert_eq!(
            describe("UTC", noon()).unwrap(),
            "It is 12:00 on Monday, 19 October 2026 (UTC)."
        );
    }

    #[test]
    fn fixed_offsets() {
        assert!(describe("+05:30", noon()).unwrap().starts_with("It is 17:30 on Monday"));
        assert!(describe("UTC-8", noon()).unwrap().starts_with("It is 04:00 on Monday"));
        assert!(describe("+13", noon()).unwrap().contains("Tuesday"));
    }

    #[test]
    fn local_by_default() {
        assert!(describe("", noon()).unwrap().ends_with("(local time)."));
    }

    #[test]
    fn bad_zone_rejected() {
        assert!(matches!(describe("Mars", noon()), Err(ToolError::InvalidArguments(_))));
        assert!(describe("+25", noon()).is_err());
    }

    #[tokio::test]
    async fn execute_returns_sentence() {
        let out = ClockTool.execute("utc", &CancellationToken::new()).await.unwrap();
        assert!(out.starts_with("It is "));
        assert!(out.ends_with("(UTC)."));
    }
}

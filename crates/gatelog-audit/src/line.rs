use std::fmt;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// The attributes pulled out of an event payload. Anything absent, null,
/// or not a string decodes to an empty string.
#[derive(Debug, Default, Deserialize)]
struct EventFields {
    #[serde(default, deserialize_with = "lenient_string")]
    country: String,
    #[serde(default, deserialize_with = "lenient_string")]
    path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    event_type: String,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

/// One record of the audit log.
///
/// Rendered as
/// `<timestamp> message_id=<id> country=<c> path=<p> event_type=<t>`
/// plus a trailing `raw=<json string>` when the payload could not be
/// decoded as a JSON object. Line breaks inside values are escaped, so a
/// record always occupies exactly one line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
    pub country: String,
    pub path: String,
    pub event_type: String,
    /// The undecodable payload, lossily converted to UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl LogLine {
    /// Translate an event payload. Never fails: a payload that is not a
    /// JSON object yields empty attributes and keeps its bytes in `raw`.
    pub fn from_event(message_id: &str, payload: &[u8], received_at: DateTime<Utc>) -> Self {
        let timestamp = received_at.with_nanosecond(0).unwrap_or(received_at);
        let (fields, raw) = match serde_json::from_slice::<EventFields>(payload) {
            Ok(fields) => (fields, None),
            Err(_) => (
                EventFields::default(),
                Some(String::from_utf8_lossy(payload).into_owned()),
            ),
        };
        Self {
            timestamp,
            message_id: message_id.to_string(),
            country: fields.country,
            path: fields.path,
            event_type: fields.event_type,
            raw,
        }
    }

    /// Parse a rendered line (without its trailing newline).
    ///
    /// Values are split on the following `key=` marker, so they may contain
    /// spaces. Escaped line breaks are not unescaped.
    pub fn parse(line: &str) -> AuditResult<Self> {
        let bad = || AuditError::Parse(line.to_string());
        let line = line.strip_suffix('\n').unwrap_or(line);

        let (ts, rest) = line.split_once(' ').ok_or_else(bad)?;
        let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
            .map_err(|_| bad())?
            .and_utc();

        let rest = rest.strip_prefix("message_id=").ok_or_else(bad)?;
        let (message_id, rest) = rest.split_once(" country=").ok_or_else(bad)?;
        let (country, rest) = rest.split_once(" path=").ok_or_else(bad)?;
        let (path, rest) = rest.split_once(" event_type=").ok_or_else(bad)?;
        let (event_type, raw) = match rest.split_once(" raw=") {
            Some((event_type, raw)) => {
                let raw: String = serde_json::from_str(raw).map_err(|_| bad())?;
                (event_type, Some(raw))
            }
            None => (rest, None),
        };

        Ok(Self {
            timestamp,
            message_id: message_id.to_string(),
            country: country.to_string(),
            path: path.to_string(),
            event_type: event_type.to_string(),
            raw,
        })
    }

    /// Returns `true` if the payload was not a JSON object.
    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }
}

fn escape(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains(['\n', '\r']) {
        value.replace('\n', "\\n").replace('\r', "\\r").into()
    } else {
        value.into()
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} message_id={} country={} path={} event_type={}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            escape(&self.message_id),
            escape(&self.country),
            escape(&self.path),
            escape(&self.event_type),
        )?;
        if let Some(raw) = &self.raw {
            let quoted = serde_json::to_string(raw).map_err(|_| fmt::Error)?;
            write!(f, " raw={quoted}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 9, 30, 5).unwrap()
    }

    #[test]
    fn json_event_renders_all_fields() {
        let payload = br#"{"country":"Iran","path":"/foo.txt","event_type":"forbidden_country","query":""}"#;
        let line = LogLine::from_event("123", payload, at());
        assert_eq!(
            line.to_string(),
            "2026-02-14T09:30:05Z message_id=123 country=Iran path=/foo.txt event_type=forbidden_country"
        );
        assert!(!line.is_raw());
    }

    #[test]
    fn sub_second_precision_is_dropped() {
        let ts = at() + chrono::Duration::milliseconds(750);
        let line = LogLine::from_event("1", b"{}", ts);
        assert_eq!(line.timestamp, at());
    }

    #[test]
    fn missing_and_mistyped_fields_default_to_empty() {
        let line = LogLine::from_event("1", br#"{"country":7,"path":null}"#, at());
        assert_eq!(line.country, "");
        assert_eq!(line.path, "");
        assert_eq!(line.event_type, "");
        assert!(!line.is_raw());
    }

    #[test]
    fn malformed_payload_keeps_raw_bytes() {
        let line = LogLine::from_event("9", b"not json at all", at());
        assert_eq!(line.country, "");
        assert_eq!(line.path, "");
        assert_eq!(line.event_type, "");
        assert_eq!(line.raw.as_deref(), Some("not json at all"));
        assert_eq!(
            line.to_string(),
            "2026-02-14T09:30:05Z message_id=9 country= path= event_type= raw=\"not json at all\""
        );
    }

    #[test]
    fn json_non_object_is_raw() {
        let line = LogLine::from_event("9", b"[1,2,3]", at());
        assert_eq!(line.raw.as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn invalid_utf8_is_lossy_raw() {
        let line = LogLine::from_event("9", &[0xff, 0xfe, b'a'], at());
        let raw = line.raw.unwrap();
        assert!(raw.ends_with('a'));
        assert!(raw.contains('\u{fffd}'));
    }

    #[test]
    fn line_breaks_are_escaped() {
        let line = LogLine::from_event("1", br#"{"path":"/a\nb","country":"x\r"}"#, at());
        let rendered = line.to_string();
        assert!(!rendered.contains('\n'));
        assert!(!rendered.contains('\r'));
        assert!(rendered.contains("path=/a\\nb"));
    }

    #[test]
    fn parse_reverses_display() {
        let line = LogLine::from_event(
            "42",
            br#"{"country":"North Korea","path":"/docs/a file.txt","event_type":"forbidden_country"}"#,
            at(),
        );
        assert_eq!(LogLine::parse(&line.to_string()).unwrap(), line);

        let raw = LogLine::from_event("43", b"garbage \"quoted\"", at());
        assert_eq!(LogLine::parse(&format!("{raw}\n")).unwrap(), raw);
    }

    #[test]
    fn parse_rejects_foreign_lines() {
        assert!(LogLine::parse("hello world").is_err());
        assert!(LogLine::parse("2026-02-14T09:30:05Z id=1").is_err());
        assert!(LogLine::parse("").is_err());
    }

    proptest! {
        #[test]
        fn any_payload_yields_exactly_one_line(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let rendered = LogLine::from_event("m", &payload, at()).to_string();
            prop_assert!(!rendered.contains('\n'));
            prop_assert!(rendered.starts_with("2026-02-14T09:30:05Z message_id=m "));
        }

        #[test]
        fn string_fields_survive(country in "[A-Za-z ]{0,16}", path in "/[a-z0-9/._-]{0,24}") {
            let payload = serde_json::json!({"country": country, "path": path, "event_type": "file_served"});
            let line = LogLine::from_event("m", payload.to_string().as_bytes(), at());
            prop_assert_eq!(&line.country, &country);
            prop_assert_eq!(&line.path, &path);
        }
    }
}

use chrono::{DateTime, Utc};
use redis::streams::StreamId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid {0}")]
    Invalid(&'static str),
}

/// One vote event as delivered by the stream, keyed by the stream-assigned
/// entry id that must be acknowledged after processing.
#[derive(Debug, Clone)]
pub struct VoteEntry {
    pub id: String,
    pub user_id: i64,
    pub candidate_id: i64,
    pub voted_at: DateTime<Utc>,
}

impl VoteEntry {
    /// Parses a raw stream entry. `user_id` and `candidate_id` are required
    /// integers; a missing or unparseable `ts` falls back to the current
    /// wall clock rather than failing the entry.
    pub fn parse(msg: &StreamId) -> Result<Self, ParseError> {
        let user_id = field_i64(msg, "user_id")?;
        let candidate_id = field_i64(msg, "candidate_id")?;

        let voted_at = msg
            .map
            .get("ts")
            .and_then(|value| redis::from_redis_value::<String>(value).ok())
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            id: msg.id.clone(),
            user_id,
            candidate_id,
            voted_at,
        })
    }
}

fn field_i64(msg: &StreamId, field: &'static str) -> Result<i64, ParseError> {
    let value = msg.map.get(field).ok_or(ParseError::Missing(field))?;

    redis::from_redis_value::<i64>(value).map_err(|_| ParseError::Invalid(field))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use redis::Value;

    use super::*;

    fn stream_id(id: &str, fields: &[(&str, &str)]) -> StreamId {
        StreamId {
            id: id.to_string(),
            map: fields
                .iter()
                .map(|(k, v)| (k.to_string(), Value::BulkString(v.as_bytes().to_vec())))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_parse_valid_entry() {
        let msg = stream_id(
            "1-0",
            &[
                ("user_id", "7"),
                ("candidate_id", "3"),
                ("ts", "2025-06-01T12:00:00.000000001Z"),
            ],
        );

        let entry = VoteEntry::parse(&msg).unwrap();
        assert_eq!(entry.id, "1-0");
        assert_eq!(entry.user_id, 7);
        assert_eq!(entry.candidate_id, 3);
        assert_eq!(
            entry.voted_at.to_rfc3339(),
            "2025-06-01T12:00:00.000000001+00:00"
        );
    }

    #[test]
    fn test_parse_missing_user_id() {
        let msg = stream_id("1-0", &[("candidate_id", "3")]);
        assert!(matches!(
            VoteEntry::parse(&msg),
            Err(ParseError::Missing("user_id"))
        ));
    }

    #[test]
    fn test_parse_missing_candidate_id() {
        let msg = stream_id("1-0", &[("user_id", "7")]);
        assert!(matches!(
            VoteEntry::parse(&msg),
            Err(ParseError::Missing("candidate_id"))
        ));
    }

    #[test]
    fn test_parse_non_integer_user_id() {
        let msg = stream_id("1-0", &[("user_id", "xyz"), ("candidate_id", "3")]);
        assert!(matches!(
            VoteEntry::parse(&msg),
            Err(ParseError::Invalid("user_id"))
        ));
    }

    #[test]
    fn test_parse_integer_value_variant() {
        let mut msg = stream_id("2-0", &[("candidate_id", "3")]);
        msg.map.insert("user_id".to_string(), Value::Int(42));

        let entry = VoteEntry::parse(&msg).unwrap();
        assert_eq!(entry.user_id, 42);
    }

    #[test]
    fn test_parse_unparseable_ts_falls_back_to_now() {
        let msg = stream_id(
            "1-0",
            &[
                ("user_id", "7"),
                ("candidate_id", "3"),
                ("ts", "not-a-timestamp"),
            ],
        );

        let before = Utc::now();
        let entry = VoteEntry::parse(&msg).unwrap();
        let after = Utc::now();

        assert!(entry.voted_at >= before && entry.voted_at <= after);
    }

    #[test]
    fn test_parse_missing_ts_falls_back_to_now() {
        let msg = stream_id("1-0", &[("user_id", "7"), ("candidate_id", "3")]);

        let before = Utc::now();
        let entry = VoteEntry::parse(&msg).unwrap();
        let after = Utc::now();

        assert!(entry.voted_at >= before && entry.voted_at <= after);
    }
}

use chrono::{DateTime, SecondsFormat, Utc};
use proto::result::v1::{GetTotalsResponse, SubscribeTotalsResponse, Totals};
use sqlx::PgPool;

/// Point-in-time totals: shard counters summed per candidate, ascending by
/// candidate id, plus the most recent vote timestamp.
pub struct Snapshot {
    pub totals: Vec<(i64, i64)>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// The two queries run outside a shared transaction; a slight skew
    /// between totals and timestamp is tolerated.
    pub async fn fetch(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let totals: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT candidate_id, SUM(cnt)::BIGINT
             FROM totals_sharded
             GROUP BY candidate_id
             ORDER BY candidate_id",
        )
        .fetch_all(pool)
        .await?;

        let updated_at: DateTime<Utc> =
            sqlx::query_scalar("SELECT COALESCE(MAX(voted_at), NOW()) FROM votes")
                .fetch_one(pool)
                .await?;

        Ok(Self { totals, updated_at })
    }

    pub fn into_get_response(self) -> GetTotalsResponse {
        GetTotalsResponse {
            totals: proto_totals(&self.totals),
            updated_at: rfc3339(&self.updated_at),
        }
    }

    pub fn into_subscribe_response(self) -> SubscribeTotalsResponse {
        SubscribeTotalsResponse {
            totals: proto_totals(&self.totals),
            updated_at: rfc3339(&self.updated_at),
        }
    }
}

fn proto_totals(totals: &[(i64, i64)]) -> Vec<Totals> {
    totals
        .iter()
        .map(|&(candidate_id, count)| Totals {
            candidate_id: candidate_id as u64,
            count: count as u64,
        })
        .collect()
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            totals: vec![(1, 2), (2, 1)],
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 45).unwrap(),
        }
    }

    #[test]
    fn test_get_response_preserves_order() {
        let response = snapshot().into_get_response();

        let pairs: Vec<(u64, u64)> = response
            .totals
            .iter()
            .map(|t| (t.candidate_id, t.count))
            .collect();
        assert_eq!(pairs, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_updated_at_is_rfc3339_utc() {
        let response = snapshot().into_get_response();
        assert_eq!(response.updated_at, "2025-06-01T12:30:45Z");
    }

    #[test]
    fn test_empty_snapshot_has_no_totals() {
        let empty = Snapshot {
            totals: Vec::new(),
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        };

        let response = empty.into_subscribe_response();
        assert!(response.totals.is_empty());
        assert_eq!(response.updated_at, "2025-06-01T00:00:00Z");
    }
}

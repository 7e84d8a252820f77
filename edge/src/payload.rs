use proto::result::v1::{GetTotalsResponse, SubscribeTotalsResponse, Totals};
use serde::Serialize;

/// JSON shape served to browsers, for both the one-shot endpoint and each
/// SSE frame.
#[derive(Serialize)]
pub struct TotalsPayload {
    pub totals: Vec<CandidateTotal>,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct CandidateTotal {
    pub candidate_id: u64,
    pub count: u64,
}

fn candidate_totals(totals: Vec<Totals>) -> Vec<CandidateTotal> {
    totals
        .into_iter()
        .map(|t| CandidateTotal {
            candidate_id: t.candidate_id,
            count: t.count,
        })
        .collect()
}

impl From<GetTotalsResponse> for TotalsPayload {
    fn from(response: GetTotalsResponse) -> Self {
        Self {
            totals: candidate_totals(response.totals),
            updated_at: response.updated_at,
        }
    }
}

impl From<SubscribeTotalsResponse> for TotalsPayload {
    fn from(response: SubscribeTotalsResponse) -> Self {
        Self {
            totals: candidate_totals(response.totals),
            updated_at: response.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_json_shape() {
        let payload = TotalsPayload::from(GetTotalsResponse {
            totals: vec![
                Totals {
                    candidate_id: 1,
                    count: 2,
                },
                Totals {
                    candidate_id: 2,
                    count: 1,
                },
            ],
            updated_at: "2025-06-01T12:30:45Z".to_string(),
        });

        let body = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            body,
            r#"{"totals":[{"candidate_id":1,"count":2},{"candidate_id":2,"count":1}],"updated_at":"2025-06-01T12:30:45Z"}"#
        );
    }

    #[test]
    fn test_empty_payload_json_shape() {
        let payload = TotalsPayload::from(SubscribeTotalsResponse {
            totals: Vec::new(),
            updated_at: "2025-06-01T00:00:00Z".to_string(),
        });

        let body = serde_json::to_string(&payload).unwrap();
        assert_eq!(body, r#"{"totals":[],"updated_at":"2025-06-01T00:00:00Z"}"#);
    }
}

use std::sync::Arc;

use axum::{
    Json,
    extract::{State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    database::{append_vote, fetch_totals},
    error::AppError,
    state::State,
};

#[derive(Deserialize)]
pub struct VoteRequest {
    pub user_id: i64,
    pub candidate_id: i64,
}

impl VoteRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.user_id <= 0 {
            return Err(AppError::Validation("user_id must be positive".to_string()));
        }
        if self.candidate_id <= 0 {
            return Err(AppError::Validation(
                "candidate_id must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct VoteResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct TotalsResponse {
    pub totals: Vec<CandidateTotal>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CandidateTotal {
    pub candidate_id: i64,
    pub count: i64,
}

pub async fn vote_handler(
    AxumState(state): AxumState<Arc<State>>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) =
        payload.map_err(|_| AppError::Validation("invalid payload".to_string()))?;
    request.validate()?;

    let mut redis = state.redis.clone();
    append_vote(&mut redis, &state.config.redis_stream, &request)
        .await
        .map_err(|err| {
            warn!("Failed to append vote to stream: {err}");
            AppError::Upstream("failed to enqueue vote")
        })?;

    Ok((StatusCode::ACCEPTED, Json(VoteResponse { status: "accepted" })))
}

pub async fn results_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<Json<TotalsResponse>, AppError> {
    let response = fetch_totals(&state.pg).await.map_err(|err| {
        warn!("Failed to query totals: {err}");
        AppError::Upstream("failed to query totals")
    })?;

    Ok(Json(response))
}

pub async fn health_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_valid_request() {
        let request = VoteRequest {
            user_id: 1,
            candidate_id: 2,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_invalid_user_id() {
        let request = VoteRequest {
            user_id: 0,
            candidate_id: 2,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_invalid_candidate_id() {
        let request = VoteRequest {
            user_id: 1,
            candidate_id: -1,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_vote_response_shape() {
        let body = serde_json::to_string(&VoteResponse { status: "accepted" }).unwrap();
        assert_eq!(body, r#"{"status":"accepted"}"#);
    }

    #[test]
    fn test_totals_response_shape() {
        let response = TotalsResponse {
            totals: vec![
                CandidateTotal {
                    candidate_id: 1,
                    count: 2,
                },
                CandidateTotal {
                    candidate_id: 2,
                    count: 1,
                },
            ],
            updated_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        };

        let body = serde_json::to_string(&response).unwrap();
        assert_eq!(
            body,
            r#"{"totals":[{"candidate_id":1,"count":2},{"candidate_id":2,"count":1}],"updated_at":"2025-01-02T03:04:05Z"}"#
        );
    }
}

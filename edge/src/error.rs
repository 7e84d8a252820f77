use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("{}", .0.message())]
    Upstream(tonic::Status),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };

        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

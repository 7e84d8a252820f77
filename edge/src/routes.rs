use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::State as AxumState,
    http::{StatusCode, header},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use proto::result::v1::{GetTotalsRequest, SubscribeTotalsRequest};
use tokio_stream::StreamExt;
use tonic::Request;
use tracing::warn;

use crate::{error::EdgeError, payload::TotalsPayload, state::State};

const GET_TOTALS_DEADLINE: Duration = Duration::from_secs(2);
const SSE_PING_INTERVAL: Duration = Duration::from_secs(60);

pub async fn results_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<Json<TotalsPayload>, EdgeError> {
    let mut client = state.client.clone();

    let mut request = Request::new(GetTotalsRequest {});
    request.set_timeout(GET_TOTALS_DEADLINE);

    let response = client.get_totals(request).await.map_err(|status| {
        warn!("get totals failed: {status}");
        EdgeError::Upstream(status)
    })?;

    Ok(Json(TotalsPayload::from(response.into_inner())))
}

/// Translates the gRPC subscription into server-sent events: an `:ok`
/// comment preamble, a `:ping` keep-alive, and one `data:` frame per
/// upstream snapshot. An upstream error ends the response; EventSource
/// clients reconnect on their own.
pub async fn stream_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<impl IntoResponse, EdgeError> {
    let mut client = state.client.clone();

    let upstream = client
        .subscribe_totals(Request::new(SubscribeTotalsRequest {
            tenant: "default".to_string(),
        }))
        .await
        .map_err(|status| {
            warn!("subscribe totals failed: {status}");
            EdgeError::Upstream(status)
        })?
        .into_inner();

    let events = tokio_stream::once(Ok(Event::default().comment("ok"))).chain(
        upstream
            .map_while(|message| message.ok())
            .map(|message| Event::default().json_data(TotalsPayload::from(message))),
    );

    let sse = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(SSE_PING_INTERVAL).text("ping"));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    ))
}

pub async fn health_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

//! `POST /generate`: validate the upload, then stream items as NDJSON.
//!
//! Each line is a JSON array of the items so far and is strictly longer
//! than the one before; a successful stream ends on a line of four items.
//! A failure after the stream started is written as a final
//! `{ "error": ..., "code": ... }` line.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{future, Stream, StreamExt};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, GenerateRequest, StreamErrorLine, NDJSON_CONTENT_TYPE};
use crate::pipeline::encoder::validate_payload;
use crate::pipeline::{GenerationEvent, GenerationHandler};

pub async fn generate(
    State(ctx): State<ApiContext>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    // Only the first file is used
    let extra_files = request.files.len().saturating_sub(1);
    let document = request.files.into_iter().next().ok_or(ApiError::NoFiles)?;
    let mode = GenerationHandler::parse_mode(&request.mode)
        .map_err(|_| ApiError::InvalidMode(request.mode.clone()))?;
    let size = validate_payload(&document)?;

    tracing::info!(
        %mode,
        document = %document.name,
        size,
        extra_files,
        "Generation request accepted"
    );

    let events = ctx.handler.generate(Some(Arc::new(document)), mode);
    let body = Body::from_stream(ndjson_lines(events));
    Ok(([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response())
}

/// Render events as NDJSON, skipping any item line that would not grow.
fn ndjson_lines<S>(events: S) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static
where
    S: Stream<Item = GenerationEvent> + Send + 'static,
{
    let mut written: Option<usize> = None;
    events.filter_map(move |event| {
        let line = match event {
            GenerationEvent::Partial(items) | GenerationEvent::Done(items) => {
                if written.is_some_and(|n| items.len() <= n) {
                    None
                } else {
                    written = Some(items.len());
                    Some(encode_line(&items))
                }
            }
            GenerationEvent::Error(error) => {
                Some(encode_line(&StreamErrorLine::from_error(&error)))
            }
        };
        future::ready(line.map(Ok))
    })
}

fn encode_line<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => format!("{json}\n"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode stream line");
            "{\"error\":\"An internal error occurred\",\"code\":\"BACKEND_ERROR\"}\n".to_string()
        }
    }
}

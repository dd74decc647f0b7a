//! HTTP face of the range-serving interceptor

use crate::api::server::AppContext;
use crate::error::{Error, Result};
use crate::media::{serve_track, ServedMedia, FALLBACK_CONTENT_TYPE};
use axum::{
    extract::{Path, State},
    http::{
        header::{ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
};

/// Track ids in the media route are positive integers
pub fn parse_track_id(raw: &str) -> Result<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::InvalidIdentifier(raw.to_string())),
    }
}

impl IntoResponse for ServedMedia {
    fn into_response(self) -> Response {
        let status = if self.is_partial() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&self.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE)),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.content_length()));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Some(range) = self.content_range() {
            if let Ok(value) = HeaderValue::from_str(&range) {
                headers.insert(CONTENT_RANGE, value);
            }
        }

        (status, headers, self.body).into_response()
    }
}

/// GET|HEAD <scope>/audio/:id
pub async fn serve_audio(
    State(ctx): State<AppContext>,
    Path(raw_id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let range = headers.get(RANGE).and_then(|value| value.to_str().ok());

    let result = match parse_track_id(&raw_id) {
        Ok(id) => serve_track(&ctx.tracks, id, range, method == Method::HEAD).await,
        Err(e) => Err(e),
    };

    no_store(match result {
        Ok(served) => served.into_response(),
        Err(e) => e.into_response(),
    })
}

/// GET|HEAD <scope>/audio/ - the id segment is empty
pub async fn missing_audio_id() -> Response {
    no_store(Error::InvalidIdentifier(String::new()).into_response())
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

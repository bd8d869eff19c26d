//! Bridge between axum and the inbound pipeline.
//!
//! An axum request becomes an [`HttpEvent`], the event is served by an
//! [`HttpHandler`], and the resulting [`HttpResponse`] becomes an axum response.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::body::{Body, to_bytes};
use axum::extract::{FromRequest, Query, Request};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use inbound::{HttpEvent, HttpHandler, HttpResponse};

/// Largest request body the gateway accepts.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Extracts the whole request as an [`HttpEvent`].
///
/// Path parameters are not included; route handlers add the ones they capture.
/// An unreadable query string or body never rejects the request here: it is
/// recorded on the event and reported by the adapter once authentication has
/// run.
#[derive(Debug)]
pub struct GatewayEvent(pub HttpEvent);

impl<S: Send + Sync> FromRequest<S> for GatewayEvent {
    type Rejection = Infallible;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();

        let mut event = HttpEvent::new(parts.method.as_str(), parts.uri.path());
        for name in parts.headers.keys() {
            let values: Vec<&str> = parts
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            if !values.is_empty() {
                event = event.with_header(name.as_str(), values.join(", "));
            }
        }

        match Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
            Ok(Query(query)) => event.query_parameters = query,
            Err(_) => event = event.with_rejection("Invalid query string"),
        }

        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) if bytes.is_empty() => {}
            Ok(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(body) => event = event.with_body(body),
                Err(_) => event = event.with_rejection("Request body is not UTF-8"),
            },
            Err(_) => event = event.with_rejection("Request body could not be read"),
        }

        Ok(GatewayEvent(event))
    }
}

/// Wraps a pipeline response so axum handlers can return it.
#[derive(Debug)]
pub struct GatewayResponse(pub HttpResponse);

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let HttpResponse {
            status_code,
            headers,
            body,
            ..
        } = self.0;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() =
            StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        for (name, value) in headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}

/// Serves `event` with `handler`.
pub async fn dispatch(handler: &dyn HttpHandler, event: HttpEvent) -> Response {
    GatewayResponse(handler.handle(event).await).into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::header::CONTENT_TYPE;
    use common::AppError;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_event_carries_method_path_query_headers_and_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/prompts?limit=5")
            .header("Authorization", "Bearer dev")
            .header("x-trace", "a")
            .header("x-trace", "b")
            .body(Body::from(r#"{"prompt":"hi"}"#))
            .unwrap();

        let GatewayEvent(event) = GatewayEvent::from_request(request, &()).await.unwrap();

        assert_eq!(event.method, "POST");
        assert_eq!(event.path, "/prompts");
        assert_eq!(event.query_parameter("limit"), Some("5"));
        assert_eq!(event.header("authorization"), Some("Bearer dev"));
        assert_eq!(event.header("x-trace"), Some("a, b"));
        assert_eq!(event.json_body().unwrap(), Some(json!({"prompt": "hi"})));
    }

    #[tokio::test]
    async fn test_empty_body_is_absent() {
        let request = Request::builder().uri("/prompts").body(Body::empty()).unwrap();
        let GatewayEvent(event) = GatewayEvent::from_request(request, &()).await.unwrap();
        assert_eq!(event.body, None);
    }

    #[tokio::test]
    async fn test_non_utf8_body_is_recorded_not_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/prompts")
            .body(Body::from(vec![0xff, 0xfe]))
            .unwrap();

        let GatewayEvent(event) = GatewayEvent::from_request(request, &()).await.unwrap();

        assert_eq!(event.body, None);
        assert_eq!(event.rejection.as_deref(), Some("Request body is not UTF-8"));
        assert!(matches!(event.json_body(), Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_oversized_body_is_recorded() {
        let request = Request::builder()
            .method("POST")
            .uri("/prompts")
            .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))
            .unwrap();

        let GatewayEvent(event) = GatewayEvent::from_request(request, &()).await.unwrap();

        assert_eq!(event.rejection.as_deref(), Some("Request body could not be read"));
    }

    #[test]
    fn test_response_keeps_status_and_headers() {
        let response = GatewayResponse(HttpResponse::json(202, &json!({"id": "p1"}))).into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_unknown_status_becomes_500() {
        let response = GatewayResponse(HttpResponse::empty(1000)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

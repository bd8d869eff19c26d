//! HTTP trigger envelope and response formatting.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use common::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One HTTP invocation as delivered by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpEvent {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub path_parameters: HashMap<String, String>,
    #[serde(default)]
    pub query_parameters: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Why the gateway could not read the request; reported after authentication.
    #[serde(skip)]
    pub rejection: Option<String>,
}

impl HttpEvent {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Marks the request as unreadable without failing it up front.
    pub fn with_rejection(mut self, reason: impl Into<String>) -> Self {
        self.rejection = Some(reason.into());
        self
    }

    pub fn with_json_body(self, body: &Value) -> Self {
        self.with_body(body.to_string())
    }

    pub fn with_path_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_query_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_parameters.insert(name.into(), value.into());
        self
    }

    /// Looks up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters.get(name).map(String::as_str)
    }

    pub fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query_parameters.get(name).map(String::as_str)
    }

    /// The raw body, treating an empty or whitespace-only body as absent.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref().filter(|b| !b.trim().is_empty())
    }

    /// Fails with a bad request when the gateway could not read the request.
    pub fn readable(&self) -> Result<(), AppError> {
        match &self.rejection {
            Some(reason) => Err(AppError::bad_request(reason.clone())),
            None => Ok(()),
        }
    }

    /// Parses the body as JSON. `Ok(None)` when there is no body.
    pub fn json_body(&self) -> Result<Option<Value>, AppError> {
        self.readable()?;
        self.body()
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|_| AppError::bad_request("Request body is not valid JSON"))
            })
            .transpose()
    }
}

/// The response handed back to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl HttpResponse {
    /// A JSON response with the given status.
    ///
    /// A value that cannot be serialized becomes a 500 with a fixed body.
    pub fn json<T: Serialize + ?Sized>(status_code: u16, value: &T) -> Self {
        let (status_code, body) = match serde_json::to_string(value) {
            Ok(body) => (status_code, body),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize response body");
                (500, r#"{"message":"Internal server error"}"#.to_string())
            }
        };

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Self {
            status_code,
            headers,
            body,
            is_base64_encoded: false,
        }
    }

    /// A response with no body.
    pub fn empty(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: String::new(),
            is_base64_encoded: false,
        }
    }

    /// Parses the body back into JSON. `None` for empty or non-JSON bodies.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

pub fn ok_json<T: Serialize>(value: &T) -> HttpResponse {
    HttpResponse::json(200, value)
}

pub fn created_json<T: Serialize>(value: &T) -> HttpResponse {
    HttpResponse::json(201, value)
}

pub fn accepted_json<T: Serialize>(value: &T) -> HttpResponse {
    HttpResponse::json(202, value)
}

pub fn no_content<T>(_: &T) -> HttpResponse {
    HttpResponse::empty(204)
}

/// Anything that can serve one HTTP event.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn handle(&self, event: HttpEvent) -> HttpResponse;
}

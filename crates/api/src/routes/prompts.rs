//! Prompt submission and lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use common::{AppError, CallerIdentity, FieldError};
use domain::{
    GetPrompt, GetPromptInput, ListPrompts, ListPromptsInput, MessagePublisher, PromptAccepted,
    PromptRepository, SubmitPrompt, SubmitPromptInput,
};
use inbound::{
    HttpEvent, HttpHandler, IdentityResolver, RequestAdapter, RequestOptions, accepted_json,
    body_parser,
};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::with_caller;
use crate::AppState;
use crate::gateway::{GatewayEvent, dispatch};

/// POST /prompts: stores the prompt and queues it, answering 202.
pub fn submit_adapter(
    prompts: PromptRepository,
    publisher: Arc<dyn MessagePublisher>,
    resolver: Arc<dyn IdentityResolver>,
) -> Arc<dyn HttpHandler> {
    Arc::new(
        RequestAdapter::<SubmitPromptInput, _>::with_formatter(
            "submit_prompt",
            SubmitPrompt::new(prompts, publisher),
            accepted_json::<PromptAccepted>,
        )
        .parser(parse_submission)
        .options(
            RequestOptions::new()
                .require_auth()
                .require_body()
                .required_fields(&["prompt"]),
        )
        .identity_resolver(resolver),
    )
}

fn parse_submission(event: &HttpEvent, identity: Option<&CallerIdentity>) -> Result<Value, AppError> {
    let mut candidate = with_caller(body_parser(event, identity)?, identity)?;
    if let Some(fields) = candidate.as_object_mut() {
        fields.insert("id".to_string(), Value::String(Uuid::now_v7().to_string()));
    }
    Ok(candidate)
}

/// GET /prompts/{id}: the caller's prompt, 404 for anyone else's.
pub fn get_adapter(prompts: PromptRepository, resolver: Arc<dyn IdentityResolver>) -> Arc<dyn HttpHandler> {
    Arc::new(
        RequestAdapter::<GetPromptInput, _>::new("get_prompt", GetPrompt::new(prompts))
            .parser(|event, identity| {
                with_caller(json!({ "id": event.path_parameter("id") }), identity)
            })
            .options(RequestOptions::new().require_auth())
            .identity_resolver(resolver),
    )
}

/// GET /prompts?limit=n: the caller's most recent prompts, newest first.
pub fn list_adapter(prompts: PromptRepository, resolver: Arc<dyn IdentityResolver>) -> Arc<dyn HttpHandler> {
    Arc::new(
        RequestAdapter::<ListPromptsInput, _>::new("list_prompts", ListPrompts::new(prompts))
            .parser(parse_listing)
            .options(RequestOptions::new().require_auth())
            .identity_resolver(resolver),
    )
}

fn parse_listing(event: &HttpEvent, identity: Option<&CallerIdentity>) -> Result<Value, AppError> {
    let mut fields = Map::new();
    if let Some(limit) = event.query_parameter("limit") {
        let limit: u64 = limit.trim().parse().map_err(|_| {
            AppError::validation(
                "Invalid query parameters",
                vec![FieldError::new("limit", "must be a positive integer")],
            )
        })?;
        fields.insert("limit".to_string(), Value::from(limit));
    }
    with_caller(Value::Object(fields), identity)
}

pub async fn submit(State(state): State<Arc<AppState>>, GatewayEvent(event): GatewayEvent) -> Response {
    dispatch(state.submit_prompt.as_ref(), event).await
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    GatewayEvent(event): GatewayEvent,
) -> Response {
    dispatch(state.get_prompt.as_ref(), event.with_path_parameter("id", id)).await
}

pub async fn list(State(state): State<Arc<AppState>>, GatewayEvent(event): GatewayEvent) -> Response {
    dispatch(state.list_prompts.as_ref(), event).await
}

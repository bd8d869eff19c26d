//! Credit top-ups.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use domain::{AddCredits, AddCreditsInput, CreditLedger};
use inbound::{HttpHandler, IdentityResolver, RequestAdapter, RequestOptions, body_parser};

use super::with_caller;
use crate::AppState;
use crate::gateway::{GatewayEvent, dispatch};

/// POST /credits: adds `amount` to the caller's key and returns the balance.
pub fn add_adapter(ledger: Arc<dyn CreditLedger>, resolver: Arc<dyn IdentityResolver>) -> Arc<dyn HttpHandler> {
    Arc::new(
        RequestAdapter::<AddCreditsInput, _>::new("add_credits", AddCredits::new(ledger))
            .parser(|event, identity| with_caller(body_parser(event, identity)?, identity))
            .options(
                RequestOptions::new()
                    .require_auth()
                    .require_body()
                    .required_fields(&["amount"]),
            )
            .identity_resolver(resolver),
    )
}

pub async fn add(State(state): State<Arc<AppState>>, GatewayEvent(event): GatewayEvent) -> Response {
    dispatch(state.add_credits.as_ref(), event).await
}

//! Account sign-up.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use domain::{
    IdentityProvider, KeyManagement, ProvisionAccount, ProvisionAccountInput, ProvisionedAccount,
};
use inbound::{HttpHandler, RequestAdapter, RequestOptions, created_json};
use item_store::ItemStore;

use crate::AppState;
use crate::gateway::{GatewayEvent, dispatch};

/// POST /accounts: provisions a user, an API key and the account record.
///
/// Unauthenticated; this is how callers obtain a credential.
pub fn provision_adapter(
    identity_provider: Arc<dyn IdentityProvider>,
    keys: Arc<dyn KeyManagement>,
    store: Arc<dyn ItemStore>,
) -> Arc<dyn HttpHandler> {
    Arc::new(
        RequestAdapter::<ProvisionAccountInput, _>::with_formatter(
            "provision_account",
            ProvisionAccount::new(identity_provider, keys, store),
            created_json::<ProvisionedAccount>,
        )
        .options(RequestOptions::new().require_body().required_fields(&["email"])),
    )
}

pub async fn provision(State(state): State<Arc<AppState>>, GatewayEvent(event): GatewayEvent) -> Response {
    dispatch(state.provision_account.as_ref(), event).await
}

//! Explicit wiring of collaborators, use cases and adapters.

use std::sync::Arc;

use common::RetryPolicy;
use domain::{
    CreditLedger, IdentityProvider, InMemoryIdentityProvider, InMemoryKeyManagement,
    InMemoryLlmProvider, KeyManagement, LlmProvider, MessagePublisher, ProcessPrompt,
    ProcessPromptInput, PromptRepository, StoreCreditLedger,
};
use inbound::{
    BearerIdentityResolver, HttpHandler, IdentityAuthority, IdentityResolver, QueueAdapter,
    RecordAcknowledger,
};
use item_store::{InMemoryItemStore, ItemStore};

use crate::authority::AccountAuthority;
use crate::config::Config;
use crate::queue::InMemoryQueue;
use crate::routes::{accounts, credits, prompts};
use crate::worker::QueueWorker;

/// Source reference of the prompt processing queue.
pub const PROMPT_QUEUE: &str = "prompt-processing";

/// The worker that drains the prompt processing queue.
pub type PromptWorker = QueueWorker<ProcessPromptInput, ProcessPrompt>;

/// External systems the use cases depend on.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ItemStore>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub keys: Arc<dyn KeyManagement>,
    pub llm: Arc<dyn LlmProvider>,
    pub authority: Arc<dyn IdentityAuthority>,
    /// Reported by the health endpoint.
    pub store_backend: &'static str,
}

impl Services {
    /// In-memory collaborators around `store`. The identity authority accepts
    /// `AUTH_TOKENS` and the secrets of provisioned keys.
    pub fn in_memory(config: &Config, store: Arc<dyn ItemStore>, store_backend: &'static str) -> Self {
        let keys: Arc<dyn KeyManagement> = Arc::new(InMemoryKeyManagement::new());
        Self {
            store,
            identity_provider: Arc::new(InMemoryIdentityProvider::new()),
            authority: Arc::new(AccountAuthority::new(config.authority(), Arc::clone(&keys))),
            keys,
            llm: Arc::new(InMemoryLlmProvider::new()),
            store_backend,
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::in_memory(&Config::default(), Arc::new(InMemoryItemStore::new(domain::table_schema())), "memory")
    }
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub submit_prompt: Arc<dyn HttpHandler>,
    pub get_prompt: Arc<dyn HttpHandler>,
    pub list_prompts: Arc<dyn HttpHandler>,
    pub provision_account: Arc<dyn HttpHandler>,
    pub add_credits: Arc<dyn HttpHandler>,
    pub queue: Arc<InMemoryQueue>,
    pub store_backend: &'static str,
}

/// Builds the application state and the queue worker that serves it.
pub fn create_state(config: &Config, services: Services) -> (Arc<AppState>, PromptWorker) {
    let queue = Arc::new(InMemoryQueue::new(
        PROMPT_QUEUE,
        config.queue.visibility_timeout,
        config.queue.max_receive_count,
    ));
    let publisher: Arc<dyn MessagePublisher> = Arc::clone(&queue) as Arc<dyn MessagePublisher>;
    let acknowledger = Arc::clone(&queue) as Arc<dyn RecordAcknowledger>;

    let repository = PromptRepository::new(Arc::clone(&services.store));
    let ledger: Arc<dyn CreditLedger> = Arc::new(StoreCreditLedger::new(
        Arc::clone(&services.store),
        Arc::clone(&services.keys),
    ));
    let resolver: Arc<dyn IdentityResolver> =
        Arc::new(BearerIdentityResolver::new(Arc::clone(&services.authority)));

    let process = ProcessPrompt::new(
        repository.clone(),
        Arc::clone(&services.llm),
        Arc::clone(&ledger),
        RetryPolicy::new(config.llm_retry.max_attempts, config.llm_retry.delay),
    );
    let adapter = QueueAdapter::new("process_prompt", process, acknowledger)
        .options(config.queue.options());
    let worker = QueueWorker::new(
        Arc::clone(&queue),
        Arc::new(adapter),
        config.queue.batch_size,
        config.queue.poll_interval,
    );

    let state = Arc::new(AppState {
        submit_prompt: prompts::submit_adapter(repository.clone(), publisher, Arc::clone(&resolver)),
        get_prompt: prompts::get_adapter(repository.clone(), Arc::clone(&resolver)),
        list_prompts: prompts::list_adapter(repository, Arc::clone(&resolver)),
        provision_account: accounts::provision_adapter(
            Arc::clone(&services.identity_provider),
            Arc::clone(&services.keys),
            Arc::clone(&services.store),
        ),
        add_credits: credits::add_adapter(ledger, resolver),
        queue,
        store_backend: services.store_backend,
    });

    (state, worker)
}

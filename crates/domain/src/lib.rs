//! Use cases of the serverless backend.
//!
//! Every use case implements [`common::UseCase`] and is reached through an
//! inbound adapter:
//! - prompts: [`SubmitPrompt`], [`GetPrompt`], [`ListPrompts`] over HTTP and
//!   [`ProcessPrompt`] from the processing queue
//! - accounts: [`ProvisionAccount`], a saga across three external systems
//! - credits: [`AddCredits`] on top of a [`CreditLedger`]
//!
//! External systems are reached through the traits in [`services`].

pub mod accounts;
pub mod credits;
pub mod error;
pub mod keys;
pub mod prompts;
pub mod services;

pub use accounts::{AccountRecord, ProvisionAccount, ProvisionAccountInput, ProvisionedAccount};
pub use credits::{AddCredits, AddCreditsInput, CreditBalance, CreditLedger, StoreCreditLedger};
pub use error::DomainError;
pub use keys::table_schema;
pub use prompts::{
    GetPrompt, GetPromptInput, ListPrompts, ListPromptsInput, ProcessPrompt, ProcessPromptInput,
    PromptAccepted, PromptList, PromptRecord, PromptRepository, PromptStatus, SubmitPrompt,
    SubmitPromptInput,
};
pub use services::{
    ApiKey, Completion, IdentityProvider, InMemoryIdentityProvider, InMemoryKeyManagement,
    InMemoryLlmProvider, InMemoryPublisher, KeyManagement, LlmProvider, MessagePublisher,
    ProvisionedUser,
};

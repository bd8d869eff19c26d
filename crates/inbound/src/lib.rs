//! Inbound adapter pipeline.
//!
//! Turns the two kinds of trigger this backend receives into validated,
//! authenticated use-case calls:
//!
//! - [`RequestAdapter`]: one HTTP event in, one [`HttpResponse`] out. Every
//!   error is classified by [`ErrorClassifier`]; nothing escapes unclassified.
//! - [`QueueAdapter`]: one batch of queue records in, a [`BatchResult`] out.
//!   A record is acknowledged (deleted from its source) if and only if its use
//!   case succeeded.

pub mod classify;
pub mod extract;
pub mod http;
pub mod identity;
pub mod queue;
pub mod request;

pub use classify::{ClassifiedError, ErrorBody, ErrorClassifier};
pub use extract::extract_payload;
pub use http::{
    HttpEvent, HttpHandler, HttpResponse, accepted_json, created_json, no_content, ok_json,
};
pub use identity::{
    AuthorityError, BearerIdentityResolver, IdentityAuthority, IdentityResolver,
    StaticTokenAuthority, VerifiedClaims,
};
pub use queue::{
    BatchResult, MessageExtractor, QueueAdapter, QueueEvent, QueueOptions, QueueRecord,
    QueueRecordOutcome, RecordAcknowledger,
};
pub use request::{EventParser, RequestAdapter, RequestOptions, ResponseFormatter, body_parser};

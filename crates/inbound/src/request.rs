//! Per-invocation HTTP pipeline.
//!
//! Processing order is fixed:
//! 1. resolve the caller (when `require_auth`)
//! 2. reject a missing body (when `require_body`)
//! 3. reject absent `required_fields`
//! 4. build the candidate input with the event parser
//! 5. validate it against the input schema
//! 6. invoke the use case
//! 7. format the output
//!
//! Any failure in steps 1-6 is classified into a status and body.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, CallerIdentity, FieldError, UseCase, Validate, parse_input};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::classify::ErrorClassifier;
use crate::http::{HttpEvent, HttpHandler, HttpResponse, ok_json};
use crate::identity::IdentityResolver;

/// Builds the candidate domain input from the event and the resolved caller.
pub type EventParser =
    Arc<dyn Fn(&HttpEvent, Option<&CallerIdentity>) -> Result<Value, AppError> + Send + Sync>;

/// Turns a use-case output into the HTTP response.
pub type ResponseFormatter<O> = Arc<dyn Fn(&O) -> HttpResponse + Send + Sync>;

/// Pre-parse checks applied to every invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub require_auth: bool,
    pub require_body: bool,
    pub required_fields: Vec<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }

    pub fn require_body(mut self) -> Self {
        self.require_body = true;
        self
    }

    pub fn required_fields(mut self, fields: &[&str]) -> Self {
        self.required_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// The default event parser: the JSON body, or an empty object without one.
pub fn body_parser(event: &HttpEvent, _: Option<&CallerIdentity>) -> Result<Value, AppError> {
    Ok(event
        .json_body()?
        .unwrap_or_else(|| Value::Object(Map::new())))
}

/// Adapts one use case to HTTP invocations.
///
/// Stateless between invocations; one adapter serves concurrent requests.
pub struct RequestAdapter<T, U>
where
    T: Send + 'static,
    U: UseCase<T>,
{
    name: String,
    use_case: U,
    parser: EventParser,
    formatter: ResponseFormatter<U::Output>,
    options: RequestOptions,
    resolver: Option<Arc<dyn IdentityResolver>>,
    _input: PhantomData<fn() -> T>,
}

impl<T, U> RequestAdapter<T, U>
where
    T: DeserializeOwned + Validate + Send + 'static,
    U: UseCase<T>,
{
    /// Creates an adapter with the default body parser and a 200 JSON formatter.
    pub fn new(name: impl Into<String>, use_case: U) -> Self
    where
        U::Output: Serialize + 'static,
    {
        Self::with_formatter(name, use_case, ok_json::<U::Output>)
    }

    /// Creates an adapter with an explicit response formatter.
    pub fn with_formatter(
        name: impl Into<String>,
        use_case: U,
        formatter: impl Fn(&U::Output) -> HttpResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            use_case,
            parser: Arc::new(body_parser),
            formatter: Arc::new(formatter),
            options: RequestOptions::default(),
            resolver: None,
            _input: PhantomData,
        }
    }

    pub fn parser(
        mut self,
        parser: impl Fn(&HttpEvent, Option<&CallerIdentity>) -> Result<Value, AppError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: &HttpEvent) -> Result<U::Output, AppError> {
        let identity = if self.options.require_auth {
            let resolver = self.resolver.as_ref().ok_or_else(|| {
                AppError::Internal(format!("{}: no identity resolver configured", self.name))
            })?;
            let identity = resolver.resolve(event).await?;
            if identity.principal_id.trim().is_empty() {
                return Err(AppError::Authentication("principal id missing".to_string()));
            }
            tracing::Span::current().record("principal_id", identity.principal_id.as_str());
            Some(identity)
        } else {
            None
        };

        event.readable()?;

        if self.options.require_body && event.body().is_none() {
            return Err(AppError::bad_request("Missing request body"));
        }

        if !self.options.required_fields.is_empty() {
            self.check_required_fields(event)?;
        }

        let candidate = (self.parser)(event, identity.as_ref())?;
        let input: T = parse_input(candidate)?;

        self.use_case.execute(input).await
    }

    /// Fails when a required field is absent. `null` and `""` count as present.
    fn check_required_fields(&self, event: &HttpEvent) -> Result<(), AppError> {
        let fields = match event.json_body()? {
            Some(Value::Object(fields)) => fields,
            Some(_) => return Err(AppError::bad_request("Request body must be a JSON object")),
            None => Map::new(),
        };

        let missing: Vec<FieldError> = self
            .options
            .required_fields
            .iter()
            .filter(|field| !fields.contains_key(field.as_str()))
            .map(|field| FieldError::new(field.as_str(), "is required"))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation("Missing required fields", missing))
        }
    }
}

#[async_trait]
impl<T, U> HttpHandler for RequestAdapter<T, U>
where
    T: DeserializeOwned + Validate + Send + 'static,
    U: UseCase<T>,
{
    #[tracing::instrument(
        skip_all,
        fields(adapter = %self.name, method = %event.method, path = %event.path, principal_id)
    )]
    async fn handle(&self, event: HttpEvent) -> HttpResponse {
        let response = match self.process(&event).await {
            Ok(output) => (self.formatter)(&output),
            Err(err) => ErrorClassifier::classify(&err).into_response(),
        };

        tracing::info!(status = response.status_code, "request handled");
        metrics::counter!(
            "http_invocations_total",
            "adapter" => self.name.clone(),
            "status" => response.status_code.to_string()
        )
        .increment(1);

        response
    }
}

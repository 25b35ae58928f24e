use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::workshop::Account;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The addressed resource does not exist. Deletion paths treat this as success.
    NotFound,
    /// The call did not complete within the configured window.
    Timeout,
    Service,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not-found",
            Self::Timeout => "timeout",
            Self::Service => "service",
        };
        f.write_str(label)
    }
}

/// Failure of a single call against the identity provider, the trigger store
/// or the notifier.
#[derive(Clone, Debug, Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub operation: &'static str,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
        }
    }

    pub fn not_found(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, operation, message)
    }

    pub fn service(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Service, operation, message)
    }

    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            operation,
            format!("no answer after {after:?}"),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }
}

/// Bounds one external call; an elapsed window becomes a `Timeout` error.
pub async fn with_deadline<T, F>(
    operation: &'static str,
    window: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(window, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(operation, window)),
    }
}

/// Treats a `NotFound` failure as success, for calls that remove something.
pub fn ignore_not_found(result: Result<(), ProviderError>) -> Result<(), ProviderError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unable to acquire access to the workshop environment: {0}")]
    Access(#[source] ProviderError),

    /// Accounts exist at this point but no deletion trigger is registered for them.
    #[error("schedule rule {rule} could not be installed: {source}")]
    Schedule {
        rule: String,
        accounts: Vec<Account>,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl LifecycleError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

//! Idempotent Execution Wrapper

use crate::coordinator::{IdempotencyScope, StatelessCoordinator};
use std::future::Future;
use std::time::Duration;

/// Outcome of an operation run through [`run_idempotent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Idempotent<T> {
    /// The operation ran and produced a value
    Executed { value: T, scope: IdempotencyScope },
    /// Another execution already claimed the key within its TTL
    Skipped { scope: IdempotencyScope },
}

impl<T> Idempotent<T> {
    /// Value of an executed operation
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Executed { value, .. } => Some(value),
            Self::Skipped { .. } => None,
        }
    }

    /// Guarantee behind the decision
    pub fn scope(&self) -> IdempotencyScope {
        match self {
            Self::Executed { scope, .. } | Self::Skipped { scope } => *scope,
        }
    }
}

/// Run `operation` only if `key` has not been claimed within `ttl`.
///
/// The future is not polled when the key is already claimed.
pub async fn run_idempotent<F, T>(
    coordinator: &StatelessCoordinator,
    key: &str,
    ttl: Duration,
    operation: F,
) -> Idempotent<T>
where
    F: Future<Output = T>,
{
    let outcome = coordinator.ensure_idempotent_operation(key, ttl).await;
    if outcome.may_proceed {
        Idempotent::Executed {
            value: operation.await,
            scope: outcome.scope,
        }
    } else {
        Idempotent::Skipped {
            scope: outcome.scope,
        }
    }
}

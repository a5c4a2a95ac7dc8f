//! Transaction scope threading: join the caller's scope or own a fresh one.

use crate::error::{ActionError, ActionResult};
use crate::store::Store;

/// Scope an action runs in. Only an `Owned` scope is ever committed or rolled back here.
pub enum ActionScope<'a, S: Store> {
    Joined(&'a S::Scope),
    Owned(S::Scope),
}

impl<'a, S: Store> ActionScope<'a, S> {
    /// Join `inbound` when given, otherwise begin a new scope.
    pub async fn enter(store: &S, inbound: Option<&'a S::Scope>) -> ActionResult<Self> {
        match inbound {
            Some(scope) => Ok(ActionScope::Joined(scope)),
            None => store
                .begin()
                .await
                .map(ActionScope::Owned)
                .map_err(ActionError::third_party),
        }
    }

    pub fn handle(&self) -> &S::Scope {
        match self {
            ActionScope::Joined(scope) => scope,
            ActionScope::Owned(scope) => scope,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, ActionScope::Owned(_))
    }

    /// Commit an owned scope on success, roll it back on failure.
    pub async fn finish<T>(self, store: &S, result: ActionResult<T>) -> ActionResult<T> {
        let ActionScope::Owned(scope) = self else {
            return result;
        };
        match result {
            Ok(value) => {
                store.commit(scope).await.map_err(ActionError::third_party)?;
                tracing::debug!("scope committed");
                Ok(value)
            }
            Err(err) => {
                rollback(store, scope, &err).await;
                Err(err)
            }
        }
    }

    /// End a read-only scope. An owned scope is rolled back whatever the outcome.
    pub async fn release<T>(self, store: &S, result: ActionResult<T>) -> ActionResult<T> {
        if let ActionScope::Owned(scope) = self {
            if let Err(err) = store.rollback(scope).await {
                tracing::warn!(error = %err, "releasing read scope failed");
            }
        }
        result
    }
}

async fn rollback<S: Store>(store: &S, scope: S::Scope, cause: &ActionError) {
    match store.rollback(scope).await {
        Ok(()) => tracing::debug!(cause = %cause, "scope rolled back"),
        Err(err) => tracing::warn!(error = %err, cause = %cause, "rollback failed"),
    }
}

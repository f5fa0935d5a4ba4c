//! Ordered middleware chain around one state transaction.
//!
//! Each middleware receives a [`Next`] and must either continue with
//! [`Next::run`] or abort with [`Next::cancel`]; both are the only ways to
//! obtain an [`Outcome`]. The innermost step commits the pending diff to the
//! context's working copy. Publishing that copy is left to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use diagram_model::StateUpdate;

use crate::{
    context::TransactionContext,
    error::{EngineError, Result},
};

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Committed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome(Flow);

impl Outcome {
    pub fn flow(self) -> Flow {
        self.0
    }

    pub fn is_committed(self) -> bool {
        self.0 == Flow::Committed
    }
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    caller: &'a str,
}

impl<'a> Next<'a> {
    /// Passes control onward. A replacement diff supersedes the pending one,
    /// which is kept in the context history under the caller's name.
    pub async fn run(
        self,
        ctx: &mut TransactionContext,
        update: Option<StateUpdate>,
    ) -> Result<Outcome> {
        if let Some(update) = update {
            ctx.replace_update(self.caller, update);
        }
        match self.rest.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    rest,
                    caller: head.name(),
                };
                head.execute(ctx, next).await
            }
            None => {
                ctx.commit();
                Ok(Outcome(Flow::Committed))
            }
        }
    }

    /// Aborts the transaction. Nothing further runs and nothing is committed.
    pub fn cancel(self) -> Outcome {
        Outcome(Flow::Cancelled)
    }
}

/// Named, ordered middleware registry. Cloning is cheap and yields an
/// independent ordering over the same middleware instances.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    entries: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.ensure_unique(middleware.name())?;
        self.entries.push(middleware);
        Ok(())
    }

    pub(crate) fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.entries.push(middleware);
    }

    pub fn register_before(&mut self, anchor: &str, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.ensure_unique(middleware.name())?;
        let index = self.position(anchor)?;
        self.entries.insert(index, middleware);
        Ok(())
    }

    pub fn register_after(&mut self, anchor: &str, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.ensure_unique(middleware.name())?;
        let index = self.position(anchor)?;
        self.entries.insert(index + 1, middleware);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn Middleware>> {
        let index = self.position(name)?;
        Ok(self.entries.remove(index))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the whole chain. An empty chain commits the requested diff as is.
    pub async fn run(&self, ctx: &mut TransactionContext) -> Result<Outcome> {
        let start = Next {
            rest: &self.entries,
            caller: "",
        };
        start.run(ctx, None).await
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            return Err(EngineError::DuplicateMiddleware(name.to_string()));
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name() == name)
            .ok_or_else(|| EngineError::UnknownMiddleware(name.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;

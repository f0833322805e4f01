//! Execution and request contexts

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::Span;

/// One of the service's execution contexts
///
/// Pools are kept per identity and per context, so work running on
/// different contexts never contends for the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionContext(usize);

impl ExecutionContext {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

/// Fixed group of contexts handed out round-robin
#[derive(Debug)]
pub(crate) struct ExecutionContexts {
    count: usize,
    next: AtomicUsize,
}

impl ExecutionContexts {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            count: count.max(1),
            next: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn get(&self, index: usize) -> Option<ExecutionContext> {
        (index < self.count).then_some(ExecutionContext(index))
    }

    pub(crate) fn next(&self) -> ExecutionContext {
        ExecutionContext(self.next.fetch_add(1, Ordering::Relaxed) % self.count)
    }
}

/// A unit of work, such as one inbound request
///
/// Carries the execution context the work runs on and a span that every
/// command issued on its behalf is recorded under.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: u64,
    context: ExecutionContext,
    span: Span,
}

impl RequestContext {
    pub(crate) fn new(id: u64, context: ExecutionContext) -> Self {
        let span = tracing::info_span!(
            target: "redbridge",
            "request",
            request_id = id,
            context = context.index()
        );
        Self { id, context, span }
    }

    /// Sequential id, unique within one storage
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let contexts = ExecutionContexts::new(3);
        let picked: Vec<usize> = (0..7).map(|_| contexts.next().index()).collect();
        assert_eq!(picked, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_at_least_one_context() {
        let contexts = ExecutionContexts::new(0);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts.get(0).map(|c| c.index()), Some(0));
        assert!(contexts.get(1).is_none());
    }
}

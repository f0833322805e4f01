//! Command logging decorator

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use redbridge_core::Result;
use redis::Value;
use tracing::{debug, warn, Instrument, Span};

use crate::client::{CommandArgs, RedisClient};

/// Wraps a client and logs every command it sends
///
/// Commands run inside `span`, so events emitted by the driver are
/// attributed to the caller (usually a request span).
pub struct LoggingClient<C: ?Sized> {
    inner: Arc<C>,
    span: Span,
}

impl<C: ?Sized> LoggingClient<C> {
    pub fn new(inner: Arc<C>, span: Span) -> Self {
        Self { inner, span }
    }

    /// The span commands are recorded under
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The undecorated client
    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }
}

impl<C: ?Sized> Clone for LoggingClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            span: self.span.clone(),
        }
    }
}

#[async_trait]
impl<C: RedisClient + ?Sized> RedisClient for LoggingClient<C> {
    async fn send(&self, command: &str, args: CommandArgs) -> Result<Value> {
        let arg_count = args.len();
        let start = Instant::now();
        let result = self
            .inner
            .send(command, args)
            .instrument(self.span.clone())
            .await;
        let elapsed = start.elapsed();

        self.span.in_scope(|| match &result {
            Ok(_) => debug!(
                target: "redbridge",
                command = %command,
                args = arg_count,
                duration_us = elapsed.as_micros() as u64,
                "Redis command"
            ),
            Err(e) => warn!(
                target: "redbridge",
                command = %command,
                args = arg_count,
                duration_us = elapsed.as_micros() as u64,
                error = %e,
                "Redis command failed"
            ),
        });

        #[cfg(feature = "metrics")]
        record_metrics(command, elapsed, result.is_ok());

        result
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(command: &str, elapsed: std::time::Duration, ok: bool) {
    let command = command.to_ascii_uppercase();
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        "redbridge_commands_total",
        "command" => command.clone(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("redbridge_command_duration_seconds", "command" => command)
        .record(elapsed.as_secs_f64());
}

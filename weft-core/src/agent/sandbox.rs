//! The shared code-execution sandbox a run's `python_code_interpreter` and
//! `terminal_command` tools are injected with: a `Mutex`-guarded
//! single-consumer handle tied to the whole run, ensured lazily on first use
//! and torn down on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::error::AgentError;

/// Names of tools that receive the shared sandbox handle injected into their
/// call arguments, mirroring `CODE_RUNNER_TOOLS` in the original agent.
pub const CODE_RUNNER_TOOLS: &[&str] = &["python_code_interpreter", "terminal_command"];

/// A running code/command execution environment. A concrete implementation
/// wraps a specific sandboxing backend (out of scope for this crate, same as
/// `CompletionService`).
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run_command(&self, command: &str) -> Result<String, AgentError>;

    /// Tears down the backing environment. Errors are logged, never
    /// propagated, matching the original's "kill, log on failure" cleanup.
    async fn kill(&self) -> Result<(), AgentError>;
}

/// Lazily-constructed, single-consumer sandbox handle shared by every tool
/// call within one agent run.
#[derive(Clone, Default)]
pub struct SharedSandbox {
    inner: Arc<Mutex<Option<Arc<dyn Sandbox>>>>,
}

impl SharedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing sandbox, or constructs one via `factory` on first
    /// call (idempotent/re-entrant, matching `_ensure_shared_sandbox`).
    pub async fn ensure<F>(&self, factory: F) -> Result<Arc<dyn Sandbox>, AgentError>
    where
        F: FnOnce() -> Result<Arc<dyn Sandbox>, AgentError>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        let sandbox = factory()?;
        *guard = Some(sandbox.clone());
        Ok(sandbox)
    }

    /// Kills the sandbox if one was ever created, logging (not propagating)
    /// failure, and always clears the handle so a later `ensure` starts fresh.
    pub async fn cleanup(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(sandbox) = guard.take() {
            if let Err(e) = sandbox.kill().await {
                warn!(error = %e, "failed to kill shared sandbox during cleanup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSandbox {
        kills: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Sandbox for CountingSandbox {
        async fn run_command(&self, command: &str) -> Result<String, AgentError> {
            Ok(format!("ran: {command}"))
        }
        async fn kill(&self) -> Result<(), AgentError> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn ensure_is_idempotent_across_calls() {
        let kills = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let shared = SharedSandbox::new();

        for _ in 0..3 {
            let calls = calls.clone();
            let kills = kills.clone();
            shared
                .ensure(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(CountingSandbox { kills }) as Arc<dyn Sandbox>)
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        shared.cleanup().await;
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }
}

//! Model Gateway: picks a live backend, caches it, and falls back on failure.
//!
//! Policy, in order:
//! 1. Use the cached active backend, probing the list in priority order if
//!    there is none. Probe-and-swap happens under the state lock.
//! 2. Call it (outside the lock). On an *unavailable* error or timeout,
//!    re-probe once and retry the same prompt once.
//! 3. If the primary path still fails and a secondary provider is
//!    configured, call it once. Its failure is final.
//!
//! The active backend is a cache, never durable state: clearing it only
//! costs one probe cycle. Its id is also published on a watch channel so
//! status reads never wait behind a probe cycle holding the lock.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::llm_client::{FallbackProvider, LlmError, ModelBackend, ModelClient};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no model backend reachable (tried: {})", .attempted.join(", "))]
    NoBackendReachable { attempted: Vec<String> },

    #[error("model backend {backend} failed: {source}")]
    Backend { backend: String, source: LlmError },

    #[error("model backend {backend} timed out after {after:?}")]
    Timeout { backend: String, after: Duration },

    #[error("secondary provider {provider} failed: {message} (primary failure: {primary})")]
    Secondary {
        provider: String,
        message: String,
        primary: String,
    },
}

/// A completion plus the identifier of the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GatewayTimeouts {
    pub probe: Duration,
    pub completion: Duration,
}

/// Snapshot reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub active_model: Option<String>,
    pub candidates: Vec<String>,
    pub secondary: Option<String>,
}

#[derive(Debug, Default)]
struct GatewayState {
    active: Option<ModelBackend>,
    /// Bumped on every swap, so a request that saw backend N failing can tell
    /// whether someone else already replaced it.
    generation: u64,
}

pub struct ModelGateway {
    backends: Vec<ModelBackend>,
    client: Arc<dyn ModelClient>,
    secondary: Option<Arc<dyn FallbackProvider>>,
    timeouts: GatewayTimeouts,
    state: Mutex<GatewayState>,
    active_id: watch::Sender<Option<String>>,
}

impl ModelGateway {
    pub fn new<I, S>(model_ids: I, client: Arc<dyn ModelClient>, timeouts: GatewayTimeouts) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backends = model_ids
            .into_iter()
            .enumerate()
            .map(|(priority, id)| ModelBackend {
                id: id.into(),
                priority,
            })
            .collect();

        Self {
            backends,
            client,
            secondary: None,
            timeouts,
            state: Mutex::new(GatewayState::default()),
            active_id: watch::Sender::new(None),
        }
    }

    pub fn with_secondary(mut self, provider: Arc<dyn FallbackProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    /// Snapshot of the backend selection. Never blocks on an in-flight probe.
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            active_model: self.active_id.borrow().clone(),
            candidates: self.backends.iter().map(|b| b.id.clone()).collect(),
            secondary: self.secondary.as_ref().map(|s| s.name().to_string()),
        }
    }

    /// Obtains one completion for `prompt`, hiding backend selection and fallback.
    pub async fn complete(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let primary_error = match self.complete_primary(prompt).await {
            Ok(completion) => return Ok(completion),
            Err(e) => e,
        };

        let Some(secondary) = &self.secondary else {
            return Err(primary_error);
        };

        let provider = secondary.name().to_string();
        warn!("Primary model path failed ({primary_error}); falling back to {provider}");

        let message = match timeout(self.timeouts.completion, secondary.complete(prompt)).await {
            Ok(Ok(text)) => {
                return Ok(Completion {
                    text,
                    model: provider,
                })
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.timeouts.completion),
        };

        Err(GatewayError::Secondary {
            provider,
            message,
            primary: primary_error.to_string(),
        })
    }

    async fn complete_primary(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let (backend, generation) = self.active_backend().await?;

        let error = match self.invoke(&backend, prompt).await {
            Ok(text) => {
                return Ok(Completion {
                    text,
                    model: backend.id,
                })
            }
            Err(e) => e,
        };

        if !error.is_unavailable() {
            return Err(GatewayError::Backend {
                backend: backend.id,
                source: error,
            });
        }

        warn!("Model backend {} unavailable ({error}); re-probing", backend.id);
        let (backend, _) = self.replace_backend(generation).await?;

        match self.invoke(&backend, prompt).await {
            Ok(text) => Ok(Completion {
                text,
                model: backend.id,
            }),
            Err(LlmError::Timeout(after)) => Err(GatewayError::Timeout {
                backend: backend.id,
                after,
            }),
            Err(source) => Err(GatewayError::Backend {
                backend: backend.id,
                source,
            }),
        }
    }

    /// Returns the cached backend, probing for one if none is active.
    async fn active_backend(&self) -> Result<(ModelBackend, u64), GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(active) = &state.active {
            return Ok((active.clone(), state.generation));
        }
        self.probe_locked(&mut state).await
    }

    /// Replaces the backend that failed at `failed_generation`, unless a
    /// concurrent request already did.
    async fn replace_backend(
        &self,
        failed_generation: u64,
    ) -> Result<(ModelBackend, u64), GatewayError> {
        let mut state = self.state.lock().await;
        if state.generation != failed_generation {
            if let Some(active) = &state.active {
                return Ok((active.clone(), state.generation));
            }
        }
        state.active = None;
        self.active_id.send_replace(None);
        self.probe_locked(&mut state).await
    }

    async fn probe_locked(
        &self,
        state: &mut GatewayState,
    ) -> Result<(ModelBackend, u64), GatewayError> {
        for backend in &self.backends {
            match timeout(self.timeouts.probe, self.client.probe(backend)).await {
                Ok(Ok(reply)) if !reply.trim().is_empty() => {
                    state.active = Some(backend.clone());
                    state.generation += 1;
                    self.active_id.send_replace(Some(backend.id.clone()));
                    info!("Model backend {} is now active", backend.id);
                    return Ok((backend.clone(), state.generation));
                }
                Ok(Ok(_)) => warn!("Probe of {} returned an empty reply", backend.id),
                Ok(Err(e)) => warn!("Probe of {} failed: {e}", backend.id),
                Err(_) => warn!(
                    "Probe of {} timed out after {:?}",
                    backend.id, self.timeouts.probe
                ),
            }
        }

        Err(GatewayError::NoBackendReachable {
            attempted: self.backends.iter().map(|b| b.id.clone()).collect(),
        })
    }

    async fn invoke(&self, backend: &ModelBackend, prompt: &str) -> Result<String, LlmError> {
        match timeout(self.timeouts.completion, self.client.complete(backend, prompt)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(LlmError::EmptyContent),
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeouts.completion)),
        }
    }
}

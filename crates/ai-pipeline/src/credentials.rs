//! Credential gate
//!
//! Video operations check that a key has been selected before submitting, and
//! an "entity not found" response sends the user back through key selection.

use crate::error::GenerationError;
use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait CredentialGate: Send + Sync {
    /// Whether a usable key is currently selected
    async fn has_selected_key(&self) -> bool;

    /// Ask the user to pick a key again
    async fn open_select_key(&self);

    /// Prompt for a key if none is selected yet
    async fn ensure_selected(&self) {
        if !self.has_selected_key().await {
            self.open_select_key().await;
        }
    }

    /// Route a failed remote call through the reselection flow.
    ///
    /// Entity-not-found errors reopen key selection and become
    /// `InvalidCredential`; everything else is returned unchanged.
    async fn recover(&self, error: GenerationError) -> GenerationError {
        if error.is_entity_not_found() {
            warn!("remote service rejected the selected key: {}", error);
            self.open_select_key().await;
            return GenerationError::InvalidCredential;
        }
        error
    }
}

/// Key taken from configuration or the environment; reselection can only
/// point the user at where the key comes from
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    api_key: Option<String>,
}

impl StaticCredentials {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[async_trait]
impl CredentialGate for StaticCredentials {
    async fn has_selected_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn open_select_key(&self) {
        warn!("select a valid API key: set GEMINI_API_KEY or `api_key` in the config file and retry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ENTITY_NOT_FOUND;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGate {
        selected: bool,
        reselections: AtomicUsize,
    }

    #[async_trait]
    impl CredentialGate for CountingGate {
        async fn has_selected_key(&self) -> bool {
            self.selected
        }

        async fn open_select_key(&self) {
            self.reselections.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_not_found_triggers_reselection() {
        let gate = CountingGate {
            selected: true,
            ..Default::default()
        };
        let err = gate
            .recover(GenerationError::Remote {
                status: 404,
                message: ENTITY_NOT_FOUND.to_string(),
            })
            .await;
        assert!(matches!(err, GenerationError::InvalidCredential));
        assert_eq!(gate.reselections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let gate = CountingGate::default();
        let err = gate
            .recover(GenerationError::MissingImage("nothing".into()))
            .await;
        assert_eq!(err.to_string(), "nothing");
        assert_eq!(gate.reselections.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ensure_selected_prompts_when_missing() {
        let gate = CountingGate::default();
        gate.ensure_selected().await;
        assert_eq!(gate.reselections.load(Ordering::SeqCst), 1);

        let ok = StaticCredentials::new(Some("  ".into()));
        assert!(!ok.has_selected_key().await);
        assert!(StaticCredentials::new(Some("k".into())).has_selected_key().await);
    }
}

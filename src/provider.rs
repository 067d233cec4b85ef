//! Which LLM provider a request goes to, and whether GIF adaptation is on for it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Stable-id queries against the host's provider registry.
pub trait ProviderDirectory: Send + Sync {
    /// Provider currently serving `session`.
    fn provider_for_session(&self, session: &str) -> Option<String>;

    fn default_provider_id(&self) -> Option<String>;
}

/// Fixed mapping, for hosts that pass provider ids up front (and for tests).
#[derive(Debug, Clone, Default)]
pub struct StaticProviders {
    default: Option<String>,
    sessions: HashMap<String, String>,
}

impl StaticProviders {
    pub fn new(default: Option<String>) -> Self {
        Self {
            default,
            sessions: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session: impl Into<String>, provider: impl Into<String>) -> Self {
        self.sessions.insert(session.into(), provider.into());
        self
    }
}

impl ProviderDirectory for StaticProviders {
    fn provider_for_session(&self, session: &str) -> Option<String> {
        self.sessions
            .get(session)
            .cloned()
            .or_else(|| self.default.clone())
    }

    fn default_provider_id(&self) -> Option<String> {
        self.default.clone()
    }
}

/// Manual mode adapts only for the configured provider; auto mode only for the
/// default one, resolved at construction and retried lazily while unknown.
pub struct ProviderGate {
    directory: Arc<dyn ProviderDirectory>,
    manual: Option<String>,
    default: Mutex<Option<String>>,
}

impl ProviderGate {
    pub fn new(directory: Arc<dyn ProviderDirectory>, manual: Option<String>) -> Self {
        let default = if manual.is_none() {
            directory.default_provider_id()
        } else {
            None
        };
        Self {
            directory,
            manual,
            default: Mutex::new(default),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.manual.is_some()
    }

    /// Provider for this request: the request's own id if set, else the session's.
    pub fn resolve(&self, session: &str, request_provider: Option<&str>) -> Option<String> {
        request_provider
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| self.directory.provider_for_session(session))
    }

    pub fn is_enabled(&self, provider_id: &str) -> bool {
        if let Some(manual) = &self.manual {
            return manual == provider_id;
        }
        let mut default = self.default.lock();
        if default.is_none() {
            *default = self.directory.default_provider_id();
            log::debug!(
                target: "gif_to_video::provider",
                "re-resolved default provider: {:?}",
                *default
            );
        }
        match default.as_deref() {
            Some(id) => id == provider_id,
            None => {
                log::warn!(
                    target: "gif_to_video::provider",
                    "no default provider known, auto mode cannot enable adaptation"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn manual_mode_matches_configured_id_only() {
        let dir = Arc::new(StaticProviders::new(Some("default".into())));
        let gate = ProviderGate::new(dir, Some("openai_1".into()));
        assert!(gate.is_manual());
        assert!(gate.is_enabled("openai_1"));
        assert!(!gate.is_enabled("default"));
    }

    #[test]
    fn auto_mode_matches_default() {
        let dir = Arc::new(StaticProviders::new(Some("gemini".into())));
        let gate = ProviderGate::new(dir, None);
        assert!(gate.is_enabled("gemini"));
        assert!(!gate.is_enabled("openai"));
    }

    #[test]
    fn resolve_prefers_request_then_session() {
        let dir = Arc::new(StaticProviders::new(Some("d".into())).with_session("s1", "p1"));
        let gate = ProviderGate::new(dir, None);
        assert_eq!(gate.resolve("s1", Some("explicit")).as_deref(), Some("explicit"));
        assert_eq!(gate.resolve("s1", Some("")).as_deref(), Some("p1"));
        assert_eq!(gate.resolve("other", None).as_deref(), Some("d"));
    }

    struct LateDefault {
        calls: AtomicUsize,
    }

    impl ProviderDirectory for LateDefault {
        fn provider_for_session(&self, _: &str) -> Option<String> {
            None
        }

        fn default_provider_id(&self) -> Option<String> {
            // Unknown at construction, available afterwards.
            (self.calls.fetch_add(1, Ordering::SeqCst) > 0).then(|| "late".to_string())
        }
    }

    #[test]
    fn default_is_re_resolved_lazily() {
        let dir = Arc::new(LateDefault {
            calls: AtomicUsize::new(0),
        });
        let gate = ProviderGate::new(dir.clone(), None);
        assert!(gate.is_enabled("late"));
        assert!(gate.is_enabled("late"));
        assert_eq!(dir.calls.load(Ordering::SeqCst), 2, "cached once known");
    }
}

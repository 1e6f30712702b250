//! The adapter contract and the adapter registry.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use scanward_core::{EngineError, EngineKind, ScanOutcome, ScanTask};

/// Normalizes one invocation of a detection engine into a typed outcome.
///
/// Implementations are called from blocking worker threads, possibly from
/// several at once, and must not touch shared mutable state beyond the
/// engine itself.
pub trait EngineAdapter: Send + Sync {
    /// Engine kind this adapter serves.
    fn kind(&self) -> EngineKind;

    /// Short display name, e.g. `clamscan`.
    fn name(&self) -> &str;

    /// Scan one file.
    ///
    /// If `token` is already cancelled the adapter returns a skipped
    /// outcome without touching the engine. Once the engine has been
    /// invoked the call runs to completion.
    fn invoke(
        &self,
        task: &ScanTask,
        token: &CancellationToken,
    ) -> Result<ScanOutcome, EngineError>;

    /// Refresh detection definitions. Returns whether the refresh succeeded.
    fn update_definitions(&self) -> bool;

    /// Whether the engine can currently be reached.
    fn is_available(&self) -> bool;
}

/// Registry of adapters keyed by engine kind, in registration order.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: IndexMap<EngineKind, Arc<dyn EngineAdapter>>,
}

impl AdapterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter, builder style.
    pub fn with(mut self, adapter: impl EngineAdapter + 'static) -> Self {
        self.insert(Arc::new(adapter));
        self
    }

    /// Register an adapter, replacing any previous adapter of the same kind.
    pub fn insert(&mut self, adapter: Arc<dyn EngineAdapter>) -> Option<Arc<dyn EngineAdapter>> {
        self.adapters.insert(adapter.kind(), adapter)
    }

    /// Look up the adapter serving `kind`.
    pub fn get(&self, kind: EngineKind) -> Option<Arc<dyn EngineAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn contains(&self, kind: EngineKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Iterate over registered adapters.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EngineAdapter>> {
        self.adapters.values()
    }

    /// Probe every adapter, returning `(name, available)` pairs.
    pub fn availability(&self) -> Vec<(String, bool)> {
        self.iter()
            .map(|adapter| (adapter.name().to_string(), adapter.is_available()))
            .collect()
    }

    /// Refresh definitions of every adapter, returning `(name, updated)` pairs.
    pub fn update_all(&self) -> Vec<(String, bool)> {
        self.iter()
            .map(|adapter| {
                let updated = adapter.update_definitions();
                if updated {
                    tracing::info!(engine = adapter.name(), "definitions updated");
                } else {
                    tracing::warn!(engine = adapter.name(), "definitions update failed");
                }
                (adapter.name().to_string(), updated)
            })
            .collect()
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.adapters.iter().map(|(kind, a)| (kind, a.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Named(&'static str, EngineKind);

    impl EngineAdapter for Named {
        fn kind(&self) -> EngineKind {
            self.1
        }
        fn name(&self) -> &str {
            self.0
        }
        fn invoke(
            &self,
            task: &ScanTask,
            _token: &CancellationToken,
        ) -> Result<ScanOutcome, EngineError> {
            Ok(ScanOutcome::clean(task, Duration::ZERO))
        }
        fn update_definitions(&self) -> bool {
            false
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_insert_replaces_same_kind() {
        let mut set = AdapterSet::new()
            .with(Named("first", EngineKind::Signature))
            .with(Named("integrity", EngineKind::Integrity));

        let previous = set.insert(Arc::new(Named("second", EngineKind::Signature)));
        assert_eq!(previous.map(|a| a.name().to_string()).as_deref(), Some("first"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(EngineKind::Signature).unwrap().name(), "second");
    }

    #[test]
    fn test_availability_in_registration_order() {
        let set = AdapterSet::new()
            .with(Named("integrity", EngineKind::Integrity))
            .with(Named("sig", EngineKind::Signature));

        let names: Vec<String> = set.availability().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["integrity", "sig"]);
    }
}

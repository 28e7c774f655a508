//! Named handler registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::handler::Handler;

/// Registry mapping unique handler names to handlers.
///
/// Mutated only before the engine starts; the dispatch loop reads a frozen
/// snapshot, so no locking is involved.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, returning the one it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(name.into(), handler)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Handler names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Handler>)> {
        self.handlers.iter().map(|(name, h)| (name.as_str(), h))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{ChangeEvent, CompletionSignal, DispatchContext, HandlerError};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        async fn handle(
            &self,
            _ctx: &DispatchContext,
            _event: &ChangeEvent,
            done: CompletionSignal,
        ) -> Result<(), HandlerError> {
            done.done();
            Err(HandlerError::Failed {
                reason: self.0.to_string(),
            })
        }
    }

    #[test]
    fn test_registry_basic() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.insert("sync", Arc::new(Named("sync"))).is_none());
        assert!(registry.insert("log", Arc::new(Named("log"))).is_none());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("sync"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["log", "sync"]);
        assert_eq!(
            format!("{registry:?}"),
            r#"HandlerRegistry { handlers: ["log", "sync"] }"#
        );
    }

    #[test]
    fn test_registry_overwrites_same_name() {
        let mut registry = HandlerRegistry::new();

        registry.insert("sync", Arc::new(Named("first")));
        let replaced = registry.insert("sync", Arc::new(Named("second")));

        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
    }
}

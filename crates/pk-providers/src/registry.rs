//! Provider registry — a name-keyed lookup over already-constructed
//! providers. No global state: a registry is built and owned by whatever
//! assembles a `Conversation`, never looked up from a static.

use std::collections::HashMap;
use std::sync::Arc;

use pk_domain::{Error, Result};

use crate::traits::Provider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("provider '{name}' not registered")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn register_then_get_round_trips() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::fixed("mock", "hello")));
        assert!(registry.get("mock").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn require_errors_on_missing_provider() {
        let registry = ProviderRegistry::new();
        assert!(registry.require("missing").is_err());
    }
}

//
// src/proxy/pool.rs
//

use super::backend::BackendSet;
use crate::load_balancer::LoadBalancer;
use dashmap::DashMap;
use std::sync::Arc;

/// Backend sets keyed by tenant, so one tenant's traffic and health state
/// never mixes with another's.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    sets: DashMap<String, Arc<BackendSet>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tenant's backend set, created empty on first use.
    pub fn tenant(&self, tenant: &str) -> Arc<BackendSet> {
        if let Some(set) = self.sets.get(tenant) {
            return set.value().clone();
        }

        self.sets
            .entry(tenant.to_string())
            .or_insert_with(|| {
                let set = BackendSet::new(tenant);
                tracing::debug!(
                    tenant,
                    balancer = set.balancer().name(),
                    "tracking backends for new tenant"
                );
                Arc::new(set)
            })
            .value()
            .clone()
    }

    pub fn all(&self) -> Vec<Arc<BackendSet>> {
        self.sets.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tenants_are_isolated() {
        let registry = BackendRegistry::new();
        registry.tenant("a").refresh(&["http://a1".to_string()]).await;
        registry.tenant("b").refresh(&["http://b1".to_string()]).await;

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tenant("a").select_next().await.as_deref(), Some("http://a1"));
        assert_eq!(registry.tenant("b").select_next().await.as_deref(), Some("http://b1"));
    }

    #[test]
    fn same_set_is_returned() {
        let registry = BackendRegistry::new();
        let first = registry.tenant("a");
        let second = registry.tenant("a");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }
}

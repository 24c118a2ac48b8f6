// src/proxy/backend.rs
use crate::load_balancer::{LoadBalancer, RoundRobinBalancer};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Membership {
    configured: Vec<String>,
    healthy: Vec<String>,
}

/// Backends of one tenant: everything configured, plus the subset that is
/// currently eligible for selection.
///
/// Backends that have not been probed yet are eligible. After a health pass
/// only the probed result counts, so a pass that finds nothing healthy leaves
/// the set empty until a later pass.
#[derive(Debug)]
pub struct BackendSet {
    tenant: String,
    membership: RwLock<Membership>,
    balancer: RoundRobinBalancer,
}

impl BackendSet {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self::with_balancer(tenant, RoundRobinBalancer::new())
    }

    pub fn with_balancer(tenant: impl Into<String>, balancer: RoundRobinBalancer) -> Self {
        Self {
            tenant: tenant.into(),
            membership: RwLock::new(Membership::default()),
            balancer,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Overwrite the configured backends with the tenant's current list.
    ///
    /// Healthy members that are no longer configured are dropped, newly
    /// configured ones join the healthy set until the next health pass.
    /// If dropping removed members leaves nothing healthy, the set is
    /// re-seeded from the new configuration.
    pub async fn refresh(&self, backends: &[String]) {
        let mut guard = self.membership.write().await;
        if guard.configured == backends {
            return;
        }

        let Membership { configured, healthy } = &mut *guard;
        let had_healthy = !healthy.is_empty();
        healthy.retain(|url| backends.contains(url));
        for url in backends {
            if !configured.contains(url) && !healthy.contains(url) {
                healthy.push(url.clone());
            }
        }
        if had_healthy && healthy.is_empty() {
            *healthy = backends.to_vec();
        }
        *configured = backends.to_vec();
    }

    /// Next healthy backend in rotation, or `None` when nothing is eligible.
    pub async fn select_next(&self) -> Option<String> {
        // length check and indexing both happen on this guard's view
        let guard = self.membership.read().await;
        self.balancer.select(&guard.healthy).cloned()
    }

    pub async fn configured(&self) -> Vec<String> {
        self.membership.read().await.configured.clone()
    }

    pub async fn healthy(&self) -> Vec<String> {
        self.membership.read().await.healthy.clone()
    }

    /// Replace the healthy subset with the result of a health pass. Entries
    /// that stopped being configured while the pass ran are discarded.
    /// Returns the size of the published set.
    pub async fn publish_healthy(&self, mut healthy: Vec<String>) -> usize {
        let mut guard = self.membership.write().await;
        healthy.retain(|url| guard.configured.contains(url));
        guard.healthy = healthy;
        guard.healthy.len()
    }

    pub fn balancer(&self) -> &RoundRobinBalancer {
        &self.balancer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("http://{n}")).collect()
    }

    #[tokio::test]
    async fn first_refresh_seeds_healthy() {
        let set = BackendSet::new("p1");
        set.refresh(&urls(&["a", "b"])).await;
        assert_eq!(set.healthy().await, urls(&["a", "b"]));
        assert_eq!(set.configured().await, urls(&["a", "b"]));
    }

    #[tokio::test]
    async fn refresh_keeps_health_results_for_same_config() {
        let set = BackendSet::new("p1");
        set.refresh(&urls(&["a", "b"])).await;
        set.publish_healthy(urls(&["b"])).await;

        set.refresh(&urls(&["a", "b"])).await;
        assert_eq!(set.healthy().await, urls(&["b"]));
    }

    #[tokio::test]
    async fn empty_pass_is_not_reseeded() {
        let set = BackendSet::new("p1");
        set.refresh(&urls(&["a"])).await;
        assert_eq!(set.publish_healthy(Vec::new()).await, 0);

        set.refresh(&urls(&["a"])).await;
        assert!(set.select_next().await.is_none());
    }

    #[tokio::test]
    async fn changed_config_drops_removed_and_admits_new() {
        let set = BackendSet::new("p1");
        set.refresh(&urls(&["a", "b"])).await;
        set.publish_healthy(urls(&["a"])).await;

        set.refresh(&urls(&["a", "c"])).await;
        assert_eq!(set.healthy().await, urls(&["a", "c"]));
    }

    #[tokio::test]
    async fn removing_last_healthy_member_reseeds() {
        let set = BackendSet::new("p1");
        set.refresh(&urls(&["a", "b"])).await;
        set.publish_healthy(urls(&["a"])).await;

        set.refresh(&urls(&["b"])).await;
        assert_eq!(set.healthy().await, urls(&["b"]));
        assert_eq!(set.select_next().await.as_deref(), Some("http://b"));
    }

    #[tokio::test]
    async fn changed_config_after_empty_pass_stays_empty() {
        let set = BackendSet::new("p1");
        set.refresh(&urls(&["a", "b"])).await;
        set.publish_healthy(Vec::new()).await;

        set.refresh(&urls(&["b"])).await;
        assert!(set.healthy().await.is_empty());
    }

    #[tokio::test]
    async fn publish_discards_unconfigured() {
        let set = BackendSet::new("p1");
        set.refresh(&urls(&["a"])).await;
        set.publish_healthy(urls(&["a", "z"])).await;
        assert_eq!(set.healthy().await, urls(&["a"]));
    }
}

// src/load_balancer/round_robin.rs
use crate::load_balancer::LoadBalancer;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rotation counter shared by every selection against one backend set.
/// Never reset; `fetch_add` wraps on overflow.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start rotating from an arbitrary counter value.
    pub fn starting_at(value: usize) -> Self {
        Self {
            counter: AtomicUsize::new(value),
        }
    }

    pub fn counter(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select<'a>(&self, backends: &'a [String]) -> Option<&'a String> {
        if backends.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % backends.len();
        backends.get(index)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

// src/load_balancer/algorithm.rs

/// Picks one backend out of the currently eligible ones.
///
/// Implementations must index only into the slice they are given, so a
/// caller holding a snapshot can never observe an out-of-range pick.
pub trait LoadBalancer: Send + Sync {
    fn select<'a>(&self, backends: &'a [String]) -> Option<&'a String>;

    fn name(&self) -> &'static str;
}

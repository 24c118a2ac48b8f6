// tests/load_balancer_tests.rs
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tenant_proxy::load_balancer::{LoadBalancer, RoundRobinBalancer};
use tenant_proxy::proxy::BackendSet;

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://10.0.0.{}:8080", i + 1)).collect()
}

#[tokio::test]
async fn test_round_robin_distribution() {
    let set = BackendSet::new("p1");
    let backends = urls(3);
    set.refresh(&backends).await;

    let mut picks = Vec::new();
    for _ in 0..6 {
        picks.push(set.select_next().await.unwrap());
    }

    assert_eq!(
        picks,
        vec![
            backends[0].clone(),
            backends[1].clone(),
            backends[2].clone(),
            backends[0].clone(),
            backends[1].clone(),
            backends[2].clone(),
        ]
    );
}

#[tokio::test]
async fn test_empty_set_never_selects() {
    let set = BackendSet::with_balancer("p1", RoundRobinBalancer::starting_at(usize::MAX - 1));
    assert!(set.select_next().await.is_none());

    set.refresh(&[]).await;
    assert!(set.select_next().await.is_none());
    assert_eq!(set.balancer().counter(), usize::MAX - 1);
}

#[tokio::test]
async fn test_shrinking_set_returns_current_member() {
    let set = BackendSet::new("p1");
    let backends = urls(3);
    set.refresh(&backends).await;

    // advance the counter past the end of the shrunken set
    assert_eq!(set.select_next().await.as_ref(), Some(&backends[0]));
    assert_eq!(set.select_next().await.as_ref(), Some(&backends[1]));

    set.publish_healthy(vec![backends[2].clone()]).await;
    for _ in 0..5 {
        assert_eq!(set.select_next().await.as_ref(), Some(&backends[2]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_selection_is_even() {
    let set = Arc::new(BackendSet::new("p1"));
    let backends = urls(4);
    set.refresh(&backends).await;

    let mut tasks = Vec::new();
    for _ in 0..100 {
        let set = set.clone();
        tasks.push(tokio::spawn(async move { set.select_next().await }));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for task in tasks {
        let pick = task.await.unwrap().unwrap();
        *counts.entry(pick).or_default() += 1;
    }

    assert_eq!(counts.len(), 4);
    assert!(counts.values().all(|&count| count == 25));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_selection_while_set_changes() {
    let set = Arc::new(BackendSet::new("p1"));
    let backends = urls(5);
    set.refresh(&backends).await;

    let writer = {
        let set = set.clone();
        let backends = backends.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let keep = (i % backends.len()) + 1;
                set.publish_healthy(backends[..keep].to_vec()).await;
                tokio::task::yield_now().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let set = set.clone();
        let backends = backends.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..500 {
                if let Some(pick) = set.select_next().await {
                    assert!(backends.contains(&pick));
                }
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

proptest! {
    #[test]
    fn prop_each_member_once_per_cycle(n in 1usize..32, start in 0usize..(usize::MAX / 2)) {
        let backends = urls(n);
        let rr = RoundRobinBalancer::starting_at(start);

        let picks: Vec<String> = (0..n)
            .map(|_| rr.select(&backends).cloned().unwrap())
            .collect();

        for (i, pick) in picks.iter().enumerate() {
            prop_assert_eq!(pick, &backends[(start + i) % n]);
        }
        let mut sorted = picks.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), n);
    }
}

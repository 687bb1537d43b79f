use cash_desk::core::AgentStore;
use cash_desk::{CashDesk, MemoryAgentStore, PaymentClient, SqliteAgentStore, StoreOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn sqlite_desk(dir: &TempDir) -> CashDesk<SqliteAgentStore, PaymentClient> {
    let store = SqliteAgentStore::open(dir.path().join("desk.db"), StoreOptions::default()).unwrap();
    // Routing never touches the payment API.
    let client = PaymentClient::new("http://127.0.0.1:1", "unused").unwrap();
    CashDesk::new(Arc::new(store), client).with_contention_retries(10)
}

fn spread<S: AgentStore>(store: &S) -> (u64, u64) {
    let counts: Vec<u64> = store
        .agents()
        .unwrap()
        .iter()
        .map(|agent| agent.assignment_count)
        .collect();
    let total = counts.iter().sum();
    let max = *counts.iter().max().unwrap();
    let min = *counts.iter().min().unwrap();
    (total, max - min)
}

#[tokio::test]
async fn test_sequential_assignment_is_fair() {
    let dir = TempDir::new().unwrap();
    let desk = sqlite_desk(&dir);
    for handle in ["a", "b", "c", "d", "e"] {
        assert!(desk.add_agent(handle).await.unwrap());
    }

    let mut seen: HashMap<String, u64> = HashMap::new();
    for _ in 0..503 {
        let handle = desk.assign_next().await.unwrap().unwrap();
        *seen.entry(handle).or_default() += 1;

        let (_, max_spread) = spread(desk.store().as_ref());
        assert!(max_spread <= 1);
    }

    assert_eq!(seen.len(), 5);
    let (total, max_spread) = spread(desk.store().as_ref());
    assert_eq!(total, 503);
    assert!(max_spread <= 1);
}

#[tokio::test]
async fn test_tie_break_follows_insertion_order() {
    let dir = TempDir::new().unwrap();
    let desk = sqlite_desk(&dir);
    desk.add_agent("a").await.unwrap();
    desk.add_agent("b").await.unwrap();

    assert_eq!(desk.assign_next().await.unwrap().as_deref(), Some("a"));
    assert_eq!(desk.assign_next().await.unwrap().as_deref(), Some("b"));
}

#[tokio::test]
async fn test_empty_agent_set_yields_none() {
    let dir = TempDir::new().unwrap();
    let desk = sqlite_desk(&dir);
    assert_eq!(desk.assign_next().await.unwrap(), None);
}

#[tokio::test]
async fn test_duplicate_add_is_rejected() {
    let dir = TempDir::new().unwrap();
    let desk = sqlite_desk(&dir);

    assert!(desk.add_agent("x").await.unwrap());
    assert!(!desk.add_agent("x").await.unwrap());
    assert_eq!(desk.list_agents().await.unwrap(), vec!["x".to_string()]);
}

#[tokio::test]
async fn test_removed_agent_is_no_longer_routed() {
    let dir = TempDir::new().unwrap();
    let desk = sqlite_desk(&dir);
    desk.add_agent("a").await.unwrap();
    desk.add_agent("b").await.unwrap();

    assert!(desk.remove_agent("a").await.unwrap());
    assert!(!desk.remove_agent("a").await.unwrap());
    for _ in 0..3 {
        assert_eq!(desk.assign_next().await.unwrap().as_deref(), Some("b"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_assignment_loses_no_increments() {
    let dir = TempDir::new().unwrap();
    let desk = Arc::new(sqlite_desk(&dir));
    for handle in ["a", "b", "c", "d"] {
        desk.add_agent(handle).await.unwrap();
    }

    let calls = 200;
    let mut tasks = Vec::with_capacity(calls);
    for _ in 0..calls {
        let desk = Arc::clone(&desk);
        tasks.push(tokio::spawn(async move { desk.assign_next().await }));
    }

    let mut picked = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().is_some() {
            picked += 1;
        }
    }

    assert_eq!(picked, calls);
    let (total, max_spread) = spread(desk.store().as_ref());
    assert_eq!(total, calls as u64);
    assert!(max_spread <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_instances_share_one_database() {
    let dir = TempDir::new().unwrap();
    let first = Arc::new(sqlite_desk(&dir));
    let second = Arc::new(sqlite_desk(&dir));
    first.add_agent("a").await.unwrap();
    first.add_agent("b").await.unwrap();
    first.add_agent("c").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..90 {
        let desk = if i % 2 == 0 {
            Arc::clone(&first)
        } else {
            Arc::clone(&second)
        };
        tasks.push(tokio::spawn(async move { desk.assign_next().await }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_some());
    }

    let (total, max_spread) = spread(second.store().as_ref());
    assert_eq!(total, 90);
    assert_eq!(max_spread, 0);
}

#[test]
fn test_memory_store_concurrent_threads() {
    let store = Arc::new(MemoryAgentStore::new());
    for handle in ["a", "b", "c"] {
        store.add(handle, None).unwrap();
    }

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    store.pick_and_increment().unwrap().unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let (total, max_spread) = spread(store.as_ref());
    assert_eq!(total, 200);
    assert!(max_spread <= 1);
}

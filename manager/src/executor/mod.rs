//! Bounded worker pools with per-key mutual exclusion.
//!
//! Every queued item carries a `unique_key`. A worker takes the oldest item
//! whose key is neither running nor held by an older queued item, so items
//! sharing a key run one at a time and in submission order, while items with
//! other keys overtake them freely. Each worker stops on its own sentinel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::pools::{BLOCKED_RESCAN, MAX_WORKERS, MIN_WORKERS};

#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    /// Items sharing this key never run concurrently
    fn unique_key(&self) -> String;

    /// Identifies the item itself; a second submission of a queued or
    /// running identity is refused
    fn identity(&self) -> String;

    async fn run(&self);
}

enum Slot {
    Work(Arc<dyn WorkUnit>),
    Stop,
}

#[derive(Debug, Clone, Serialize)]
pub struct InFlightUnit {
    pub key: String,
    pub identity: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub workers: usize,
    pub queued: usize,
    pub in_flight: Vec<InFlightUnit>,
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<(String, String, Slot)>,
    running: HashMap<String, InFlightUnit>,
}

impl PoolState {
    fn knows(&self, identity: &str) -> bool {
        self.queue.iter().any(|(_, id, _)| id == identity)
            || self.running.values().any(|u| u.identity == identity)
    }

    /// Oldest item whose key is free and not claimed by an older queued item
    fn take_next(&mut self) -> Option<Slot> {
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut pick = None;
        for (index, (key, _, slot)) in self.queue.iter().enumerate() {
            if matches!(slot, Slot::Stop) {
                pick = Some(index);
                break;
            }
            if !self.running.contains_key(key) && !claimed.contains(key.as_str()) {
                pick = Some(index);
                break;
            }
            claimed.insert(key.as_str());
        }

        let (key, identity, slot) = self.queue.remove(pick?)?;
        if let Slot::Work(_) = &slot {
            self.running.insert(
                key.clone(),
                InFlightUnit {
                    key,
                    identity,
                    started_at: Utc::now(),
                },
            );
        }
        Some(slot)
    }
}

struct PoolShared {
    name: String,
    state: Mutex<PoolState>,
    notify: Notify,
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    size: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `size` workers, clamped to the supported bounds
    pub fn new(name: &str, size: usize) -> Self {
        let size = size.clamp(MIN_WORKERS, MAX_WORKERS);
        let shared = Arc::new(PoolShared {
            name: name.to_string(),
            state: Mutex::new(PoolState::default()),
            notify: Notify::new(),
        });

        let workers = (0..size)
            .map(|index| {
                let shared = shared.clone();
                tokio::spawn(async move { worker_loop(shared, index).await })
            })
            .collect();

        info!("Started {} pool with {} workers", name, size);
        Self {
            shared,
            size,
            workers: Mutex::new(workers),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues a unit. Returns false when the same identity is already queued
    /// or running.
    pub async fn submit(&self, unit: Arc<dyn WorkUnit>) -> bool {
        let key = unit.unique_key();
        let identity = unit.identity();
        {
            let mut state = self.shared.state.lock().await;
            if state.knows(&identity) {
                debug!("{} pool already has {}", self.shared.name, identity);
                return false;
            }
            state.queue.push_back((key.clone(), identity.clone(), Slot::Work(unit)));
        }
        debug!("{} pool queued {} (key {})", self.shared.name, identity, key);
        self.shared.notify.notify_one();
        true
    }

    /// True while an item with this key is queued or running
    pub async fn is_busy(&self, key: &str) -> bool {
        let state = self.shared.state.lock().await;
        state.running.contains_key(key) || state.queue.iter().any(|(k, _, _)| k == key)
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock().await;
        let mut in_flight: Vec<InFlightUnit> = state.running.values().cloned().collect();
        in_flight.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        PoolStatus {
            name: self.shared.name.clone(),
            workers: self.size,
            queued: state
                .queue
                .iter()
                .filter(|(_, _, slot)| matches!(slot, Slot::Work(_)))
                .count(),
            in_flight,
        }
    }

    /// Waits until nothing is queued or running
    pub async fn wait_idle(&self) {
        loop {
            {
                let state = self.shared.state.lock().await;
                if state.queue.is_empty() && state.running.is_empty() {
                    return;
                }
            }
            tokio::time::sleep(BLOCKED_RESCAN / 4).await;
        }
    }

    /// Sends one sentinel per worker and waits for the workers to exit.
    /// Running units finish; units queued behind the sentinels are dropped.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().await;
            for _ in 0..self.size {
                state.queue.push_back((String::new(), String::new(), Slot::Stop));
            }
        }
        for _ in 0..self.size {
            self.shared.notify.notify_one();
        }

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for result in join_all(workers).await {
            if let Err(e) = result {
                warn!("{} worker ended abnormally: {}", self.shared.name, e);
            }
        }
        info!("{} pool stopped", self.shared.name);
    }
}

async fn worker_loop(shared: Arc<PoolShared>, index: usize) {
    loop {
        let next = {
            let mut state = shared.state.lock().await;
            let next = state.take_next();
            if next.is_some() && !state.queue.is_empty() {
                shared.notify.notify_one();
            }
            next
        };

        let unit = match next {
            Some(Slot::Work(unit)) => unit,
            Some(Slot::Stop) => {
                debug!("{} worker {} stopping", shared.name, index);
                return;
            }
            None => {
                // Queue empty, or every item waits on a busy key
                let _ = tokio::time::timeout(BLOCKED_RESCAN, shared.notify.notified()).await;
                continue;
            }
        };

        let key = unit.unique_key();
        let identity = unit.identity();
        // A panicking unit must not take the worker or the key with it
        let task = tokio::spawn(async move { unit.run().await });
        if let Err(e) = task.await {
            error!("{} unit {} panicked: {}", shared.name, identity, e);
        }

        shared.state.lock().await.running.remove(&key);
        shared.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        key: String,
        id: String,
        log: Arc<Mutex<Vec<String>>>,
        pause: Duration,
    }

    #[async_trait]
    impl WorkUnit for Recorder {
        fn unique_key(&self) -> String {
            self.key.clone()
        }

        fn identity(&self) -> String {
            self.id.clone()
        }

        async fn run(&self) {
            self.log.lock().await.push(format!("start {}", self.id));
            tokio::time::sleep(self.pause).await;
            self.log.lock().await.push(format!("end {}", self.id));
        }
    }

    fn unit(key: &str, id: &str, log: &Arc<Mutex<Vec<String>>>, ms: u64) -> Arc<dyn WorkUnit> {
        Arc::new(Recorder {
            key: key.into(),
            id: id.into(),
            log: log.clone(),
            pause: Duration::from_millis(ms),
        })
    }

    #[tokio::test]
    async fn same_key_runs_in_order_without_overlap() {
        let pool = WorkerPool::new("test", 4);
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(pool.submit(unit("h1", "a", &log, 50)).await);
        assert!(pool.submit(unit("h1", "b", &log, 10)).await);
        pool.wait_idle().await;

        let log = log.lock().await.clone();
        assert_eq!(log, vec!["start a", "end a", "start b", "end b"]);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn other_keys_overtake_a_blocked_item() {
        let pool = WorkerPool::new("test", 2);
        let log = Arc::new(Mutex::new(Vec::new()));
        pool.submit(unit("h1", "a", &log, 80)).await;
        pool.submit(unit("h1", "b", &log, 10)).await;
        pool.submit(unit("h2", "c", &log, 10)).await;
        pool.wait_idle().await;

        let log = log.lock().await.clone();
        let pos = |s: &str| log.iter().position(|l| l == s).unwrap();
        assert!(pos("end c") < pos("end a"));
        assert!(pos("end a") < pos("start b"));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_identity_is_refused_and_size_is_clamped() {
        let pool = WorkerPool::new("test", 500);
        assert_eq!(pool.size(), MAX_WORKERS);
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(pool.submit(unit("h1", "job_1", &log, 50)).await);
        assert!(!pool.submit(unit("h1", "job_1", &log, 50)).await);
        assert!(pool.is_busy("h1").await);
        pool.wait_idle().await;
        assert!(!pool.is_busy("h1").await);
        pool.shutdown().await;

        assert_eq!(WorkerPool::new("small", 0).size(), MIN_WORKERS);
    }
}

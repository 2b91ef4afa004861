//! Concurrency scheduler
//!
//! Runs one stage over a set of targets with a bounded pool of workers pulling
//! from a shared queue. A stage that errors or panics for a target is logged
//! and that target is left out of the returned map.

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error};

use aref_core::{Profile, StageResult, Target};
use aref_stages::Stage;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `stage` once per distinct target and collect the successes.
///
/// Uses `min(profile.threads, |targets|)` workers and returns only after every
/// worker has finished.
pub async fn run_parallel(
    targets: impl IntoIterator<Item = Target>,
    stage: Arc<dyn Stage>,
    profile: Arc<Profile>,
) -> HashMap<Target, StageResult> {
    let mut seen = HashSet::new();
    let queue: VecDeque<Target> = targets
        .into_iter()
        .filter(|target| seen.insert(target.clone()))
        .collect();

    if queue.is_empty() {
        return HashMap::new();
    }

    let workers = profile.threads.min(queue.len()).max(1);
    debug!(
        "Scheduling {} over {} targets with {} workers",
        stage.name(),
        queue.len(),
        workers
    );

    let queue = Arc::new(Mutex::new(queue));
    let results: Arc<DashMap<Target, StageResult>> = Arc::new(DashMap::new());
    let mut pool = JoinSet::new();

    for worker in 0..workers {
        let queue = queue.clone();
        let results = results.clone();
        let stage = stage.clone();
        let profile = profile.clone();

        pool.spawn(async move {
            loop {
                let next = queue.lock().pop_front();
                let Some(target) = next else {
                    break;
                };

                let outcome = AssertUnwindSafe(stage.run(&target, &profile))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(result)) => {
                        results.insert(target, result);
                    }
                    Ok(Err(e)) => {
                        error!(stage = stage.name(), host = %target, "Stage failed: {}", e);
                    }
                    Err(panic) => {
                        error!(
                            stage = stage.name(),
                            host = %target,
                            "Stage panicked: {}",
                            panic_message(panic.as_ref())
                        );
                    }
                }
            }
            debug!("Worker {} drained", worker);
        });
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            error!("Scheduler worker aborted: {}", e);
        }
    }

    match Arc::try_unwrap(results) {
        Ok(results) => results.into_iter().collect(),
        Err(shared) => shared
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aref_stages::StageError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the target, counting calls per target
    struct Echo {
        calls: DashMap<String, usize>,
        max_in_flight: AtomicUsize,
        in_flight: AtomicUsize,
    }

    impl Echo {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: DashMap::new(),
                max_in_flight: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Stage for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, target: &Target, _: &Profile) -> Result<StageResult, StageError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            *self.calls.entry(target.to_string()).or_insert(0) += 1;

            tokio::time::sleep(Duration::from_millis(5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(StageResult::new().with("target", target.as_str()))
        }
    }

    /// Fails on one target and panics on another
    struct Flaky;

    #[async_trait]
    impl Stage for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, target: &Target, _: &Profile) -> Result<StageResult, StageError> {
            match target.as_str() {
                "fails.example" => Err(StageError::Network("connection reset".to_string())),
                "panics.example" => panic!("adapter bug"),
                other => Ok(StageResult::new().with("ok", other)),
            }
        }
    }

    fn targets(names: &[&str]) -> Vec<Target> {
        names.iter().map(|n| Target::parse(n).unwrap()).collect()
    }

    fn profile(threads: usize) -> Arc<Profile> {
        Arc::new(Profile {
            threads,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_failed_and_panicked_targets_are_absent() {
        let input = targets(&["fails.example", "panics.example", "works.example"]);

        let results = run_parallel(input.clone(), Arc::new(Flaky), profile(3)).await;

        assert_eq!(results.len(), 1);
        assert!(!results.contains_key(&input[0]));
        assert!(!results.contains_key(&input[1]));
        assert_eq!(results[&input[2]].get("ok").unwrap(), "works.example");
    }

    #[tokio::test]
    async fn test_every_target_once_with_fewer_workers() {
        let names: Vec<String> = (0..12).map(|i| format!("host{i}.example.com")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let echo = Echo::new();

        let results = run_parallel(targets(&refs), echo.clone(), profile(3)).await;

        assert_eq!(results.len(), 12);
        assert_eq!(echo.calls.len(), 12);
        assert!(echo.calls.iter().all(|entry| *entry.value() == 1));
        assert!(echo.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_duplicates_run_once() {
        let echo = Echo::new();
        let input = targets(&["example.com", "example.com", "8.8.8.8"]);

        let results = run_parallel(input, echo.clone(), profile(4)).await;

        assert_eq!(results.len(), 2);
        assert_eq!(*echo.calls.get("example.com").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_two_targets_single_worker() {
        let input = targets(&["example.com", "example.org"]);

        let forward = run_parallel(input.clone(), Echo::new(), profile(1)).await;
        let reversed = run_parallel(input.into_iter().rev(), Echo::new(), profile(1)).await;

        assert_eq!(forward.len(), 2);
        assert_eq!(forward, reversed);
    }

    #[tokio::test]
    async fn test_empty_target_set() {
        let results = run_parallel(Vec::new(), Echo::new(), profile(4)).await;
        assert!(results.is_empty());
    }
}

//! Stress tests for KVModel.
//!
//! These tests verify behavior under heavy load and concurrent access.

use crate::fixtures::TestModels;
use kvmodel_core::{CoreError, Field};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of distinct entities.
    pub entity_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            entity_count: 1_000,
        }
    }
}

fn age_of(i: usize) -> i64 {
    i64::try_from(i % 151).unwrap_or(0)
}

/// Run a sequential save stress test over `entity_count` ids.
pub fn stress_sequential_saves(models: &TestModels, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let user = models.users.lookup(format!("s{}", i % config.entity_count));
        let saved = models.age.set(&user, age_of(i)).and_then(|()| user.save());
        match saved {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent save stress test; each thread owns its own ids.
pub fn stress_concurrent_saves(models: Arc<TestModels>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let per_thread_entities = (config.entity_count / config.threads).max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|thread_id| {
            let models = Arc::clone(&models);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let id = format!("t{}-{}", thread_id, i % per_thread_entities);
                    let user = models.users.lookup(id);
                    let saved = models.age.set(&user, age_of(i)).and_then(|()| user.save());
                    match saved {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a unique-claim contention test.
///
/// Every thread repeatedly tries to claim the same small pool of emails
/// for fresh entities. Each email can be claimed at most once; losers must
/// see [`CoreError::DuplicateKey`].
pub fn stress_unique_claims(models: Arc<TestModels>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let pool = config.entity_count.max(1);
    let barrier = Arc::new(Barrier::new(config.threads));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|thread_id| {
            let models = Arc::clone(&models);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                for i in 0..ops_per_thread {
                    let user = models.users.lookup(format!("c{}-{}", thread_id, i));
                    let email = format!("claim{}@example.com", i % pool);
                    let saved = models.email.set(&user, email).and_then(|()| user.save());
                    match saved {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(CoreError::DuplicateKey { .. }) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            user.free();
                        }
                        Err(err) => panic!("Unexpected error: {err}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a concurrent lookup test; returns the number of distinct instances
/// observed per id, which identity mapping keeps at one.
pub fn stress_concurrent_lookups(models: Arc<TestModels>, config: &StressConfig) -> usize {
    let barrier = Arc::new(Barrier::new(config.threads));
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let models = Arc::clone(&models);
            let barrier = Arc::clone(&barrier);
            let count = config.entity_count;
            thread::spawn(move || {
                barrier.wait();
                (0..count)
                    .map(|i| models.users.lookup(format!("l{}", i)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let seen: Vec<Vec<_>> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    (0..config.entity_count)
        .map(|i| {
            let mut distinct: Vec<_> = Vec::new();
            for entities in &seen {
                if !distinct.iter().any(|e| e == &entities[i]) {
                    distinct.push(entities[i].clone());
                }
            }
            distinct.len()
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmodel_core::Query;
    use kvmodel_store::KeyValueStore;

    fn small_config() -> StressConfig {
        StressConfig {
            operations: 400,
            threads: 4,
            entity_count: 20,
        }
    }

    #[test]
    fn test_sequential_saves() {
        let models = TestModels::new();
        let result = stress_sequential_saves(&models, &small_config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(models.users.live_count(), 20);
        let all = Query::at_least(&models.users, &models.age, &0).unwrap();
        assert_eq!(all.len().unwrap(), 20);
    }

    #[test]
    fn test_concurrent_saves() {
        let models = Arc::new(TestModels::new());
        let result = stress_concurrent_saves(Arc::clone(&models), &small_config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 400);
        for thread_id in 0..4 {
            assert!(models.store.exists(&format!("user:t{thread_id}-0")).unwrap());
        }
    }

    #[test]
    fn test_unique_claims_commit_once() {
        let models = Arc::new(TestModels::new());
        let config = StressConfig {
            operations: 200,
            threads: 4,
            entity_count: 10,
        };
        let result = stress_unique_claims(Arc::clone(&models), &config);
        assert_eq!(result.successful_ops, 10);
        assert_eq!(result.failed_ops, 190);
        for i in 0..10 {
            let owners =
                Query::equals(&models.users, &models.email, &format!("claim{i}@example.com"))
                    .unwrap();
            assert_eq!(owners.len().unwrap(), 1);
        }
    }

    #[test]
    fn test_concurrent_lookups_share_instances() {
        let models = Arc::new(TestModels::new());
        assert_eq!(stress_concurrent_lookups(Arc::clone(&models), &small_config()), 1);
        assert_eq!(models.users.live_count(), 20);
    }
}

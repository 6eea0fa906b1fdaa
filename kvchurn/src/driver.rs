//! Runs a [`Workload`] against a store and accounts for the outcome of every tick.
//!
//! The driver is strictly sequential: ticks never overlap and the keys of a tick are processed one
//! after another. Per-key failures are logged and counted but never abort a phase, and a failed
//! operation is not retried.

use bytes::Bytes;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::KvClient;
use crate::error::Error;
use crate::keys::KeySet;
use crate::phase::{CycleOutcome, Operation, Phase, PhaseOutcome, PhaseReport, RunReport};
use crate::workload::Workload;

/// Executes the phases of a [`Workload`] with a fixed key set.
#[derive(Debug)]
pub struct Driver<C> {
    workload: Workload,
    client: C,
    keys: KeySet,
    value: Bytes,
}

impl<C: KvClient> Driver<C> {
    /// Creates a driver that writes an empty value with every put.
    pub fn new(workload: Workload, client: C, keys: KeySet) -> Self {
        Self::with_value(workload, client, keys, Bytes::new())
    }

    /// Creates a driver that writes `value` with every put.
    pub fn with_value(workload: Workload, client: C, keys: KeySet, value: Bytes) -> Self {
        Self {
            workload,
            client,
            keys,
            value,
        }
    }

    /// The key set shared by all phases.
    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// Runs all enabled phases to completion, or until `token` is cancelled.
    ///
    /// The pause between the create and the delete phase happens unconditionally. Phases that are
    /// cut short by cancellation are reported as [`PhaseOutcome::Cancelled`], and all phases after
    /// them are skipped.
    pub async fn run(&self, token: &CancellationToken) -> RunReport {
        let mut report = RunReport::default();

        for phase in Phase::ALL {
            if token.is_cancelled() {
                break;
            }

            if phase == Phase::Delete && !self.settle(token).await {
                break;
            }

            if !self.workload.is_enabled(phase) {
                tracing::debug!(%phase, "phase disabled");
                continue;
            }

            let phase_report = match phase.operation() {
                Some(operation) => self.run_phase(phase, operation, token).await,
                None => {
                    let error = Error::Unsupported(phase);
                    tracing::warn!(
                        %phase,
                        error = &error as &dyn std::error::Error,
                        "skipping phase"
                    );
                    PhaseReport::unsupported(phase, self.keys.len(), self.keys.key_size())
                }
            };
            report.phases.push(phase_report);
        }

        report
    }

    /// Waits for the settle delay. Returns `false` if the wait was cancelled.
    async fn settle(&self, token: &CancellationToken) -> bool {
        let delay = self.workload.settle_delay;
        if delay.is_zero() {
            return true;
        }

        tracing::debug!(?delay, "waiting for the store to settle");
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = time::sleep(delay) => true,
        }
    }

    async fn run_phase(
        &self,
        phase: Phase,
        operation: Operation,
        token: &CancellationToken,
    ) -> PhaseReport {
        let mut report = PhaseReport::new(phase, self.keys.len(), self.keys.key_size());

        // The first tick fires one full period after the phase starts.
        let period = self.workload.tick_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for tick in 0..self.workload.frequency {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    report.outcome = PhaseOutcome::Cancelled;
                    break;
                }
                _ = ticker.tick() => {}
            }

            let cycle = self.run_cycle(tick, operation, token).await;
            tracing::info!(
                %phase,
                tick = cycle.tick,
                attempted = cycle.attempted,
                failures = cycle.failures,
                revision = cycle.revision,
                deleted = cycle.deleted,
                "cycle finished"
            );
            report.absorb(&cycle);

            if cycle.interrupted {
                break;
            }
        }

        match operation {
            Operation::Put => tracing::info!(
                count = report.key_count,
                key_size = report.key_size,
                revision = report.revision,
                failures = report.failures,
                "keys created"
            ),
            Operation::Delete => tracing::info!(
                count = report.key_count,
                key_size = report.key_size,
                revision = report.revision,
                failures = report.failures,
                deleted = report.deleted,
                "keys deleted"
            ),
        }

        report
    }

    async fn run_cycle(
        &self,
        tick: usize,
        operation: Operation,
        token: &CancellationToken,
    ) -> CycleOutcome {
        let mut cycle = CycleOutcome::new(tick);

        for key in &self.keys {
            if token.is_cancelled() {
                cycle.interrupted = true;
                break;
            }

            cycle.attempted += 1;
            match operation {
                Operation::Put => match self.client.put(key, &self.value).await {
                    Ok(response) => {
                        tracing::debug!(%key, revision = response.revision, "put key");
                        cycle.revision = Some(response.revision);
                    }
                    Err(error) => {
                        tracing::error!(
                            %key,
                            error = &error as &dyn std::error::Error,
                            "failed to put key"
                        );
                        cycle.failures += 1;
                    }
                },
                Operation::Delete => match self.client.delete(key).await {
                    Ok(response) => {
                        tracing::debug!(
                            %key,
                            revision = response.revision,
                            deleted = response.deleted,
                            "deleted key"
                        );
                        cycle.revision = Some(response.revision);
                        if response.deleted == 1 {
                            cycle.deleted += 1;
                        } else {
                            tracing::warn!(
                                %key,
                                deleted = response.deleted,
                                "deleted zero or multiple keys"
                            );
                        }
                    }
                    Err(error) => {
                        tracing::error!(
                            %key,
                            error = &error as &dyn std::error::Error,
                            "failed to delete key"
                        );
                        cycle.failures += 1;
                    }
                },
            }
        }

        cycle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::client::{DeleteResponse, PutResponse};
    use crate::keys::KeyGenerator;
    use crate::memory::{Call, InMemoryStore};

    fn workload(key_count: usize, key_size: usize, frequency: usize) -> Workload {
        Workload::builder()
            .key_count(key_count)
            .key_size(key_size)
            .frequency(frequency)
            .phases([Phase::Create, Phase::Delete])
            .build()
            .unwrap()
    }

    fn keys(count: usize, size: usize) -> KeySet {
        KeyGenerator::new(42).generate(count, size)
    }

    #[tokio::test(start_paused = true)]
    async fn create_only_puts_every_key() {
        let store = InMemoryStore::new();
        let workload = Workload::builder()
            .key_count(3)
            .key_size(4)
            .frequency(1)
            .phases([Phase::Create])
            .build()
            .unwrap();
        let driver = Driver::new(workload, store.clone(), keys(3, 4));

        let report = driver.run(&CancellationToken::new()).await;

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        for (call, key) in calls.iter().zip(driver.keys()) {
            assert_eq!(call, &Call::Put(key.to_string(), 0));
            assert!(key.starts_with("foo/"));
            assert_eq!(key.len(), 8);
        }

        assert_eq!(report.phases.len(), 1);
        let create = report.get(Phase::Create).unwrap();
        assert_eq!(create.outcome, PhaseOutcome::Completed);
        assert_eq!(create.ticks, 1);
        assert_eq!(create.key_count, 3);
        assert_eq!(create.key_size, 4);
        assert_eq!(create.attempted, 3);
        assert_eq!(create.revision, store.revision());
        assert_eq!(create.revision, 3);
        assert!(report.get(Phase::Delete).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_after_create_removes_every_key() {
        let store = InMemoryStore::new();
        let driver = Driver::new(workload(3, 4, 1), store.clone(), keys(3, 4));

        let report = driver.run(&CancellationToken::new()).await;

        let deletes: Vec<_> = store
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Delete(_)))
            .collect();
        assert_eq!(deletes.len(), 3);
        assert!(store.is_empty());

        let delete = report.get(Phase::Delete).unwrap();
        assert_eq!(delete.deleted, 3);
        assert_eq!(delete.failures, 0);
        assert_eq!(delete.revision, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_key_is_not_counted_as_deleted() {
        let store = InMemoryStore::new();
        let keys = keys(3, 8);
        for key in &keys {
            store.put(key, b"").await.unwrap();
        }
        store.remove(&keys[1]);

        let workload = Workload::builder()
            .key_count(3)
            .key_size(8)
            .phases([Phase::Delete])
            .build()
            .unwrap();
        let driver = Driver::new(workload, store.clone(), keys);

        let report = driver.run(&CancellationToken::new()).await;

        let delete = report.get(Phase::Delete).unwrap();
        assert_eq!(delete.attempted, 3);
        assert_eq!(delete.deleted, 2);
        assert_eq!(delete.failures, 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_put_does_not_stop_the_cycle() {
        let store = InMemoryStore::new();
        let keys = keys(5, 8);
        store.fail_on(keys[4].as_str());

        let workload = Workload::builder()
            .key_count(5)
            .key_size(8)
            .phases([Phase::Create])
            .build()
            .unwrap();
        let driver = Driver::new(workload, store.clone(), keys);

        let report = driver.run(&CancellationToken::new()).await;

        assert_eq!(store.calls().len(), 5);
        assert_eq!(store.len(), 4);

        let create = report.get(Phase::Create).unwrap();
        assert_eq!(create.attempted, 5);
        assert_eq!(create.failures, 1);
        // The failing key came last; the revision still reflects the fourth put.
        assert_eq!(create.revision, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_in_the_middle_keeps_going() {
        let store = InMemoryStore::new();
        let keys = keys(5, 8);
        store.fail_on(keys[2].as_str());

        let driver = Driver::new(workload(5, 8, 1), store.clone(), keys.clone());
        let report = driver.run(&CancellationToken::new()).await;

        let create = report.get(Phase::Create).unwrap();
        assert_eq!(create.failures, 1);
        assert_eq!(create.revision, 4);

        let delete = report.get(Phase::Delete).unwrap();
        assert_eq!(delete.attempted, 5);
        assert_eq!(delete.failures, 1);
        assert_eq!(delete.deleted, 4);
        assert!(!store.contains(&keys[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_frequency_issues_no_operations() {
        let store = InMemoryStore::new();
        let driver = Driver::new(workload(10, 8, 0), store.clone(), keys(10, 8));

        let report = driver.run(&CancellationToken::new()).await;

        assert!(store.calls().is_empty());
        for phase in [Phase::Create, Phase::Delete] {
            let phase_report = report.get(phase).unwrap();
            assert_eq!(phase_report.ticks, 0);
            assert_eq!(phase_report.revision, 0);
            assert_eq!(phase_report.outcome, PhaseOutcome::Completed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_create_touches_nothing() {
        let store = InMemoryStore::new();
        let workload = Workload::builder()
            .key_count(4)
            .key_size(8)
            .phases([Phase::Delete])
            .build()
            .unwrap();
        let driver = Driver::new(workload, store.clone(), keys(4, 8));

        let report = driver.run(&CancellationToken::new()).await;

        assert!(report.get(Phase::Create).is_none());
        assert!(store.calls().iter().all(|call| matches!(call, Call::Delete(_))));

        let delete = report.get(Phase::Delete).unwrap();
        assert_eq!(delete.deleted, 0);
        assert_eq!(delete.revision, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_ticks_keep_latest_revision() {
        let store = InMemoryStore::new();
        let driver = Driver::new(workload(2, 8, 3), store.clone(), keys(2, 8));

        let report = driver.run(&CancellationToken::new()).await;

        let create = report.get(Phase::Create).unwrap();
        assert_eq!(create.ticks, 3);
        assert_eq!(create.attempted, 6);
        assert_eq!(create.revision, 6);

        // Only the first delete tick finds the keys.
        let delete = report.get(Phase::Delete).unwrap();
        assert_eq!(delete.ticks, 3);
        assert_eq!(delete.attempted, 6);
        assert_eq!(delete.deleted, 2);
        assert_eq!(delete.revision, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_paced_by_the_timer() {
        let store = InMemoryStore::new();
        let workload = Workload::builder()
            .key_count(1)
            .key_size(8)
            .frequency(3)
            .tick_interval(Duration::from_secs(2))
            .settle_delay(Duration::from_secs(5))
            .phases([Phase::Create, Phase::Delete])
            .build()
            .unwrap();
        let driver = Driver::new(workload, store, keys(1, 8));

        let start = Instant::now();
        driver.run(&CancellationToken::new()).await;

        // 3 ticks of create, the settle delay, then 3 ticks of delete.
        assert_eq!(start.elapsed(), Duration::from_secs(3 * 2 + 5 + 3 * 2));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_runs_without_create() {
        let store = InMemoryStore::new();
        let workload = Workload::builder()
            .frequency(0)
            .settle_delay(Duration::from_secs(5))
            .phases([Phase::Delete])
            .build()
            .unwrap();
        let driver = Driver::new(workload, store, keys(0, 8));

        let start = Instant::now();
        driver.run(&CancellationToken::new()).await;

        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn reserved_phases_report_unsupported() {
        let store = InMemoryStore::new();
        let workload = Workload::builder()
            .key_count(2)
            .key_size(8)
            .phases(Phase::ALL)
            .build()
            .unwrap();
        let driver = Driver::new(workload, store.clone(), keys(2, 8));

        let report = driver.run(&CancellationToken::new()).await;

        let outcomes: Vec<_> = report
            .phases
            .iter()
            .map(|report| (report.phase, report.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (Phase::Create, PhaseOutcome::Completed),
                (Phase::Delete, PhaseOutcome::Completed),
                (Phase::Compaction, PhaseOutcome::Unsupported),
                (Phase::Defragmentation, PhaseOutcome::Unsupported),
                (Phase::Cleanup, PhaseOutcome::Unsupported),
            ]
        );
        assert_eq!(store.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn value_size_governs_payload() {
        let store = InMemoryStore::new();
        let workload = Workload::builder()
            .key_count(2)
            .key_size(8)
            .value_size(16)
            .phases([Phase::Create])
            .build()
            .unwrap();
        let value = KeyGenerator::new(1).payload(16);
        let driver = Driver::with_value(workload, store.clone(), keys(2, 8), value.clone());

        driver.run(&CancellationToken::new()).await;

        for key in driver.keys() {
            assert_eq!(store.get(key), Some(value.clone()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_does_nothing() {
        let store = InMemoryStore::new();
        let driver = Driver::new(workload(3, 8, 1), store.clone(), keys(3, 8));

        let token = CancellationToken::new();
        token.cancel();
        let report = driver.run(&token).await;

        assert!(report.phases.is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_ticks() {
        let store = InMemoryStore::new();
        let driver = Driver::new(workload(2, 8, 10), store.clone(), keys(2, 8));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            // Lands between the second and the third tick of the create phase.
            time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let report = driver.run(&token).await;

        assert!(report.is_cancelled());
        assert_eq!(report.phases.len(), 1);
        let create = report.get(Phase::Create).unwrap();
        assert_eq!(create.outcome, PhaseOutcome::Cancelled);
        assert_eq!(create.ticks, 2);
        assert_eq!(store.calls().len(), 4);
    }

    /// Cancels the run from inside the n-th put, after the write went through.
    #[derive(Debug)]
    struct CancelOnPut {
        store: InMemoryStore,
        token: CancellationToken,
        cancel_at: usize,
        puts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl KvClient for CancelOnPut {
        async fn put(&self, key: &str, value: &[u8]) -> crate::error::Result<PutResponse> {
            let response = self.store.put(key, value).await;
            if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_at {
                self.token.cancel();
            }
            response
        }

        async fn delete(&self, key: &str) -> crate::error::Result<DeleteResponse> {
            self.store.delete(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_within_a_tick() {
        let store = InMemoryStore::new();
        let token = CancellationToken::new();
        let client = CancelOnPut {
            store: store.clone(),
            token: token.clone(),
            cancel_at: 2,
            puts: AtomicUsize::new(0),
        };
        let driver = Driver::new(workload(5, 8, 3), client, keys(5, 8));

        let report = driver.run(&token).await;

        assert_eq!(report.phases.len(), 1);
        let create = report.get(Phase::Create).unwrap();
        assert_eq!(create.outcome, PhaseOutcome::Cancelled);
        assert_eq!(create.attempted, 2);
        assert_eq!(create.failures, 0);
        assert_eq!(create.revision, 2);
        assert!(report.get(Phase::Delete).is_none());
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_settle_skips_delete() {
        let store = InMemoryStore::new();
        let driver = Driver::new(workload(2, 8, 1), store.clone(), keys(2, 8));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let report = driver.run(&token).await;

        assert_eq!(report.phases.len(), 1);
        assert_eq!(
            report.get(Phase::Create).unwrap().outcome,
            PhaseOutcome::Completed
        );
        assert_eq!(store.len(), 2);
    }
}

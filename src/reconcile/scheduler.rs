// Reconciliation Scheduler - folds accrual verdicts into the ledger
//
// Every tick:
// - Re-scans all pending orders (no cursor, a crash between ticks loses nothing)
// - Looks each one up with the accrual authority, at most `max_in_flight` at once
// - Applies each verdict in its own store transaction
// - Waits for every dispatched lookup before the next tick may start
//
// A 429 from the authority stops dispatch for the rest of the tick and pauses
// ticks until its Retry-After has passed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accrual::AccrualClient;
use crate::error::{AccrualError, AppResult};
use crate::ledger::models::VerdictApplied;
use crate::ledger::store::LedgerStore;

/// Reconciliation schedule configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the starts of two ticks
    pub interval: Duration,
    /// Upper bound on concurrent accrual lookups
    pub max_in_flight: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_in_flight: 16,
        }
    }
}

/// Counts for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub pending: usize,
    /// Verdicts written to the ledger
    pub applied: usize,
    /// Lookups that left the order as it was
    pub unchanged: usize,
    pub failed: usize,
    /// Orders never dispatched because of throttling or cancellation
    pub deferred: usize,
}

#[derive(Debug)]
enum Outcome {
    Applied,
    Unchanged,
    Failed,
    Throttled(Duration),
}

/// Periodic reconciler of pending orders against the accrual authority
pub struct ReconciliationScheduler {
    store: Arc<dyn LedgerStore>,
    accrual: Arc<dyn AccrualClient>,
    config: SchedulerConfig,
    resume_at: Mutex<Option<Instant>>,
}

impl ReconciliationScheduler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accrual: Arc<dyn AccrualClient>,
        mut config: SchedulerConfig,
    ) -> Self {
        config.max_in_flight = config.max_in_flight.max(1);
        Self {
            store,
            accrual,
            config,
            resume_at: Mutex::new(None),
        }
    }

    /// Start the scheduler in the background.
    ///
    /// The returned handle resolves once `cancel` has fired and the tick in
    /// progress, if any, has drained.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Reconciliation scheduler started (interval {:?}, max in flight {})",
            self.config.interval, self.config.max_in_flight
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_tick(&cancel).await {
                Ok(report) if report.pending > 0 => info!(
                    "Reconciliation tick: {} pending, {} applied, {} unchanged, {} failed, {} deferred",
                    report.pending, report.applied, report.unchanged, report.failed, report.deferred
                ),
                Ok(_) => {}
                Err(e) => error!("Reconciliation tick failed: {}", e),
            }
        }

        info!("Reconciliation scheduler stopped");
    }

    /// One scan-and-dispatch cycle.
    ///
    /// Dispatch stops early on cancellation or throttling, but every lookup
    /// already dispatched runs to completion before this returns.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> AppResult<TickReport> {
        if let Some(until) = *self.resume_at.lock().await {
            if Instant::now() < until {
                debug!("Accrual authority throttled, tick skipped");
                return Ok(TickReport::default());
            }
        }

        let pending = self.store.list_pending_orders().await?;
        let mut report = TickReport {
            pending: pending.len(),
            ..TickReport::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let throttled = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for order_id in pending {
            if cancel.is_cancelled() || throttled.load(Ordering::Acquire) {
                report.deferred += 1;
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.deferred += 1;
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("Lookup semaphore closed: {}", e);
                        report.deferred += 1;
                        continue;
                    }
                },
            };

            // A lookup that finished while we waited may have hit the rate limit.
            if throttled.load(Ordering::Acquire) {
                report.deferred += 1;
                continue;
            }

            let store = self.store.clone();
            let accrual = self.accrual.clone();
            let throttled = throttled.clone();
            tasks.spawn(async move {
                let outcome = reconcile_order(store.as_ref(), accrual.as_ref(), &order_id).await;
                if matches!(outcome, Outcome::Throttled(_)) {
                    throttled.store(true, Ordering::Release);
                }
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Applied) => report.applied += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Throttled(retry_after)) => {
                    report.deferred += 1;
                    let until = Instant::now() + retry_after;
                    let mut resume_at = self.resume_at.lock().await;
                    if (*resume_at).map_or(true, |current| current < until) {
                        *resume_at = Some(until);
                    }
                }
                Err(e) => {
                    error!("Reconciliation task panicked: {}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

async fn reconcile_order(
    store: &dyn LedgerStore,
    accrual: &dyn AccrualClient,
    order_id: &str,
) -> Outcome {
    let verdict = match accrual.fetch_verdict(order_id).await {
        Ok(verdict) => verdict,
        Err(AccrualError::NotRegistered(_)) => {
            debug!("Order {} not yet known to the accrual authority", order_id);
            return Outcome::Unchanged;
        }
        Err(AccrualError::RateLimited { retry_after }) => {
            warn!(
                "Accrual authority rate limited lookups, retry after {:?}",
                retry_after
            );
            return Outcome::Throttled(retry_after);
        }
        Err(e) => {
            warn!("Accrual lookup for order {} failed: {}", order_id, e);
            return Outcome::Failed;
        }
    };

    match store
        .update_order_verdict(order_id, verdict.status, verdict.accrual)
        .await
    {
        Ok(VerdictApplied::Updated { status, credited }) => {
            debug!("Order {} -> {} (credited {})", order_id, status, credited);
            Outcome::Applied
        }
        Ok(VerdictApplied::AlreadyFinal) => Outcome::Unchanged,
        Err(e) => {
            warn!("Applying verdict for order {} failed: {}", order_id, e);
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accrual::client::AccrualVerdict;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::models::{MinorUnits, OrderStatus, UserId};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    enum Script {
        Verdict(OrderStatus, i64),
        NotRegistered,
        RateLimited,
        Unavailable,
    }

    #[derive(Default)]
    struct ScriptedAuthority {
        scripts: HashMap<String, Script>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedAuthority {
        fn new(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts
                    .iter()
                    .map(|(order, script)| (order.to_string(), script.clone()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AccrualClient for ScriptedAuthority {
        async fn fetch_verdict(&self, order_id: &str) -> Result<AccrualVerdict, AccrualError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.scripts.get(order_id).cloned().unwrap_or(Script::NotRegistered) {
                Script::Verdict(status, cents) => Ok(AccrualVerdict {
                    status,
                    accrual: MinorUnits(cents),
                }),
                Script::NotRegistered => Err(AccrualError::NotRegistered(order_id.to_string())),
                Script::RateLimited => Err(AccrualError::RateLimited {
                    retry_after: Duration::from_secs(60),
                }),
                Script::Unavailable => Err(AccrualError::UnexpectedStatus(503)),
            }
        }
    }

    async fn ledger_with_orders(orders: &[&str]) -> (Arc<InMemoryLedger>, UserId) {
        let ledger = Arc::new(InMemoryLedger::new());
        let user = ledger.create_user("alice", "hash").await.unwrap();
        for order in orders {
            ledger.register_order(order, user.id).await.unwrap();
        }
        (ledger, user.id)
    }

    fn scheduler(
        ledger: Arc<InMemoryLedger>,
        authority: Arc<ScriptedAuthority>,
        max_in_flight: usize,
    ) -> ReconciliationScheduler {
        ReconciliationScheduler::new(
            ledger,
            authority,
            SchedulerConfig {
                interval: Duration::from_millis(10),
                max_in_flight,
            },
        )
    }

    #[tokio::test]
    async fn test_mixed_batch_applies_successes_and_keeps_failures_pending() {
        let (ledger, user) =
            ledger_with_orders(&["79927398713", "12345678903", "2377225624", "9278923470"]).await;
        let authority = Arc::new(ScriptedAuthority::new(&[
            ("79927398713", Script::Verdict(OrderStatus::Processed, 5000)),
            ("12345678903", Script::Unavailable),
            ("2377225624", Script::Verdict(OrderStatus::Invalid, 0)),
            ("9278923470", Script::NotRegistered),
        ]));
        let scheduler = scheduler(ledger.clone(), authority, 4);

        let report = scheduler.run_tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            report,
            TickReport {
                pending: 4,
                applied: 2,
                unchanged: 1,
                failed: 1,
                deferred: 0,
            }
        );

        assert_eq!(
            ledger.list_pending_orders().await.unwrap(),
            vec!["12345678903".to_string(), "9278923470".to_string()]
        );
        assert_eq!(ledger.balance(user).await.unwrap().current, MinorUnits(5000));
    }

    #[tokio::test]
    async fn test_processed_order_is_credited_once_across_ticks() {
        let (ledger, user) = ledger_with_orders(&["79927398713"]).await;
        let authority = Arc::new(ScriptedAuthority::new(&[(
            "79927398713",
            Script::Verdict(OrderStatus::Processed, 5000),
        )]));
        let scheduler = scheduler(ledger.clone(), authority.clone(), 2);
        let cancel = CancellationToken::new();

        scheduler.run_tick(&cancel).await.unwrap();
        let second = scheduler.run_tick(&cancel).await.unwrap();

        assert_eq!(second, TickReport::default());
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);

        let orders = ledger.list_orders(user).await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::Processed);
        assert_eq!(orders[0].accrual, MinorUnits(5000));
        assert_eq!(ledger.balance(user).await.unwrap().current, MinorUnits(5000));
    }

    #[tokio::test]
    async fn test_intermediate_verdict_keeps_order_pending() {
        let (ledger, user) = ledger_with_orders(&["79927398713"]).await;
        let authority = Arc::new(ScriptedAuthority::new(&[(
            "79927398713",
            Script::Verdict(OrderStatus::Processing, 0),
        )]));
        let scheduler = scheduler(ledger.clone(), authority, 2);

        let report = scheduler.run_tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(ledger.list_pending_orders().await.unwrap().len(), 1);
        assert_eq!(ledger.balance(user).await.unwrap().current, MinorUnits::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lookups_never_exceed_max_in_flight() {
        let orders: Vec<String> = (0..24).map(|i| format!("order-{}", i)).collect();
        let refs: Vec<&str> = orders.iter().map(String::as_str).collect();
        let (ledger, user) = ledger_with_orders(&refs).await;

        let scripts: Vec<(&str, Script)> = refs
            .iter()
            .map(|order| (*order, Script::Verdict(OrderStatus::Processed, 100)))
            .collect();
        let mut authority = ScriptedAuthority::new(&scripts);
        authority.delay = Duration::from_millis(20);
        let authority = Arc::new(authority);

        let scheduler = scheduler(ledger.clone(), authority.clone(), 3);
        let report = scheduler.run_tick(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.applied, 24);
        assert!(authority.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(ledger.balance(user).await.unwrap().current, MinorUnits(2400));
    }

    #[tokio::test]
    async fn test_rate_limit_defers_rest_of_tick() {
        let (ledger, _) = ledger_with_orders(&["79927398713", "12345678903", "2377225624"]).await;
        let authority = Arc::new(ScriptedAuthority::new(&[
            ("79927398713", Script::RateLimited),
            ("12345678903", Script::Verdict(OrderStatus::Processed, 100)),
            ("2377225624", Script::Verdict(OrderStatus::Processed, 100)),
        ]));
        let scheduler = scheduler(ledger.clone(), authority.clone(), 1);
        let cancel = CancellationToken::new();

        let report = scheduler.run_tick(&cancel).await.unwrap();
        assert_eq!(report.pending, 3);
        assert_eq!(report.deferred, 3);
        assert_eq!(report.applied, 0);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);

        // Still inside Retry-After: the next tick does not touch the authority.
        let report = scheduler.run_tick(&cancel).await.unwrap();
        assert_eq!(report, TickReport::default());
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.list_pending_orders().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_tick_dispatches_nothing() {
        let (ledger, _) = ledger_with_orders(&["79927398713", "12345678903"]).await;
        let authority = Arc::new(ScriptedAuthority::new(&[]));
        let scheduler = scheduler(ledger, authority.clone(), 2);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = scheduler.run_tick(&cancel).await.unwrap();
        assert_eq!(report.deferred, 2);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_reconciles_and_stops_on_cancel() {
        let (ledger, user) = ledger_with_orders(&["79927398713"]).await;
        let authority = Arc::new(ScriptedAuthority::new(&[(
            "79927398713",
            Script::Verdict(OrderStatus::Processed, 5000),
        )]));
        let scheduler = Arc::new(scheduler(ledger.clone(), authority, 2));

        let cancel = CancellationToken::new();
        let handle = scheduler.start(cancel.clone());

        for _ in 0..100 {
            if ledger.list_pending_orders().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(ledger.balance(user).await.unwrap().current, MinorUnits(5000));
    }
}

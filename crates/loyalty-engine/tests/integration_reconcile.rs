//! End-to-end reconciliation tests: scheduler and worker running as real
//! tasks against the in-memory store and a scripted accrual service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tokio::time::Instant;

use loyalty_common::{OrderStatus, UserId};
use loyalty_engine::accrual::{AccrualError, AccrualSource, AccrualVerdict};
use loyalty_engine::config::EngineConfig;
use loyalty_engine::engine::{Engine, EngineHandles};
use loyalty_engine::ledger::{Ledger, SubmitOutcome};
use loyalty_engine::store::Store;
use loyalty_engine::store::memory::MemoryStore;

const OWNER: UserId = UserId(1);

/// One scripted reply.
#[derive(Clone)]
enum Scripted {
    Verdict(AccrualVerdict),
    RateLimited(Duration),
    Flaky,
}

/// Scripted accrual service: returns one reply per poll and repeats the
/// final entry once the script runs out. Records every call with its
/// timestamp so tests can assert pacing behavior.
#[derive(Default)]
struct ScriptedAccrual {
    scripts: Mutex<HashMap<String, Vec<Scripted>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedAccrual {
    fn script(&self, number: &str, replies: Vec<Scripted>) {
        self.scripts.lock().insert(number.to_string(), replies);
    }

    fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().clone()
    }

    fn calls_for(&self, number: &str) -> usize {
        self.calls.lock().iter().filter(|(n, _)| n == number).count()
    }
}

#[async_trait]
impl AccrualSource for ScriptedAccrual {
    async fn get_status(&self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        self.calls.lock().push((number.to_string(), Instant::now()));

        let mut scripts = self.scripts.lock();
        let replies = scripts
            .get_mut(number)
            .ok_or_else(|| AccrualError::Malformed(format!("no script for {number}")))?;
        let reply = if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies
                .first()
                .cloned()
                .ok_or_else(|| AccrualError::Malformed("script exhausted".to_string()))?
        };

        match reply {
            Scripted::Verdict(verdict) => Ok(verdict),
            Scripted::RateLimited(retry_after) => Err(AccrualError::RateLimited { retry_after }),
            Scripted::Flaky => Err(AccrualError::Malformed("scripted failure".to_string())),
        }
    }
}

struct Harness {
    store: Arc<dyn Store>,
    source: Arc<ScriptedAccrual>,
    ledger: Ledger,
    shutdown: broadcast::Sender<()>,
    handles: EngineHandles,
}

async fn spawn_engine() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    spawn_engine_with(store).await
}

async fn spawn_engine_with(store: Arc<dyn Store>) -> Harness {
    let source = Arc::new(ScriptedAccrual::default());
    let ledger = Ledger::new(Arc::clone(&store));

    let config = EngineConfig {
        accrual_url: "http://scripted.invalid".to_string(),
        scan_interval: Duration::from_millis(10),
        poll_interval: Duration::from_millis(2),
        ..EngineConfig::default()
    };

    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&source) as Arc<dyn AccrualSource>,
        config,
    );
    let (shutdown, _) = broadcast::channel(8);
    let handles = engine.spawn(&shutdown).await.unwrap();

    Harness {
        store,
        source,
        ledger,
        shutdown,
        handles,
    }
}

async fn stop_engine(h: Harness) {
    h.shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), h.handles.scheduler)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), h.handles.worker)
        .await
        .expect("worker did not stop")
        .unwrap();
}

/// Poll the store until the order reaches `status` or the timeout expires.
async fn wait_for_status(store: &Arc<dyn Store>, number: &str, status: OrderStatus) {
    let timeout = Duration::from_secs(3);
    let deadline = Instant::now() + timeout;
    loop {
        let current = store
            .get_order(number)
            .await
            .unwrap()
            .map(|order| order.status);
        if current == Some(status) {
            return;
        }
        if Instant::now() >= deadline {
            panic!("order {number} did not reach {status:?} within {timeout:?}, got {current:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_uploaded_order_is_credited_end_to_end() {
    let h = spawn_engine().await;
    h.source.script(
        "12345678903",
        vec![
            Scripted::Verdict(AccrualVerdict::Processing),
            Scripted::Verdict(AccrualVerdict::Processed(dec!(500.75))),
        ],
    );

    assert_eq!(
        h.ledger.submit_order(OWNER, "12345678903").await.unwrap(),
        SubmitOutcome::Accepted
    );

    wait_for_status(&h.store, "12345678903", OrderStatus::Processed).await;

    let order = h.store.get_order("12345678903").await.unwrap().unwrap();
    assert_eq!(order.accrual, Some(dec!(500.75)));

    let balance = h.ledger.get_balance(OWNER).await.unwrap();
    assert_eq!(balance.current, dec!(500.75));
    assert_eq!(balance.withdrawn, dec!(0));

    // Processing then Processed: exactly two polls, none after the verdict
    assert_eq!(h.source.calls_for("12345678903"), 2);

    // Resubmitting a processed order is still the idempotent outcome
    assert_eq!(
        h.ledger.submit_order(OWNER, "12345678903").await.unwrap(),
        SubmitOutcome::AlreadyAdded
    );

    stop_engine(h).await;
}

#[tokio::test]
async fn test_invalid_order_never_credits() {
    let h = spawn_engine().await;
    h.source.script(
        "12345678903",
        vec![Scripted::Verdict(AccrualVerdict::Invalid)],
    );

    h.ledger.submit_order(OWNER, "12345678903").await.unwrap();
    wait_for_status(&h.store, "12345678903", OrderStatus::Invalid).await;

    let balance = h.ledger.get_balance(OWNER).await.unwrap();
    assert_eq!(balance.current, dec!(0));

    let order = h.store.get_order("12345678903").await.unwrap().unwrap();
    assert_eq!(order.accrual, None);

    stop_engine(h).await;
}

#[tokio::test]
async fn test_transient_errors_retry_until_verdict() {
    let h = spawn_engine().await;
    h.source.script(
        "12345678903",
        vec![
            Scripted::Flaky,
            Scripted::Flaky,
            Scripted::Verdict(AccrualVerdict::Processed(dec!(42))),
        ],
    );

    h.ledger.submit_order(OWNER, "12345678903").await.unwrap();
    wait_for_status(&h.store, "12345678903", OrderStatus::Processed).await;

    assert_eq!(h.ledger.get_balance(OWNER).await.unwrap().current, dec!(42));
    assert_eq!(h.source.calls_for("12345678903"), 3);

    stop_engine(h).await;
}

#[tokio::test]
async fn test_rate_limit_pauses_all_polling() {
    let pause = Duration::from_millis(150);

    let h = spawn_engine().await;
    h.source.script(
        "12345678903",
        vec![
            Scripted::RateLimited(pause),
            Scripted::Verdict(AccrualVerdict::Processed(dec!(10))),
        ],
    );
    h.source.script(
        "2377225624",
        vec![Scripted::Verdict(AccrualVerdict::Processed(dec!(20)))],
    );

    h.ledger.submit_order(OWNER, "12345678903").await.unwrap();
    h.ledger.submit_order(OWNER, "2377225624").await.unwrap();

    wait_for_status(&h.store, "12345678903", OrderStatus::Processed).await;
    wait_for_status(&h.store, "2377225624", OrderStatus::Processed).await;

    // Each order credited exactly once despite the pause
    let balance = h.ledger.get_balance(OWNER).await.unwrap();
    assert_eq!(balance.current, dec!(30));

    // Every poll made after the rate-limited reply waited out the pause,
    // whichever order it was for.
    let calls = h.source.calls();
    let limited_at = calls
        .iter()
        .find(|(number, _)| number == "12345678903")
        .map(|(_, at)| *at)
        .expect("rate-limited order was never polled");
    for (number, at) in &calls {
        if *at > limited_at {
            assert!(
                *at - limited_at >= Duration::from_millis(140),
                "poll for {number} ran {:?} after the 429, inside the pause window",
                *at - limited_at
            );
        }
    }

    stop_engine(h).await;
}

#[tokio::test]
async fn test_engine_recovers_claims_from_previous_run() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ledger = Ledger::new(Arc::clone(&store));

    // A previous process claimed the order and died before resolving it
    ledger.submit_order(OWNER, "12345678903").await.unwrap();
    let claimed = store.scan_unresolved().await.unwrap();
    assert_eq!(claimed, vec!["12345678903".to_string()]);

    // A fresh engine releases stale claims at startup and picks it up
    let h = spawn_engine_with(store).await;
    h.source.script(
        "12345678903",
        vec![Scripted::Verdict(AccrualVerdict::Processed(dec!(7)))],
    );

    wait_for_status(&h.store, "12345678903", OrderStatus::Processed).await;
    assert_eq!(h.ledger.get_balance(OWNER).await.unwrap().current, dec!(7));

    stop_engine(h).await;
}

#[tokio::test]
async fn test_engine_shuts_down_cleanly_while_idle() {
    let h = spawn_engine().await;

    // Let both loops reach their wait states
    tokio::time::sleep(Duration::from_millis(30)).await;
    stop_engine(h).await;
}

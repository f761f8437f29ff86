use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};
use tracing::{debug, info, warn};

use super::{
    ClientError, TimerResponse, TimerSource,
    view::{self, ViewState},
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [250, 500, 1_000];

/// Polling cadence and retry table.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Delay before each retry; a poll makes at most `retry_delays.len() + 1` attempts.
    pub retry_delays: Vec<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry_delays: DEFAULT_RETRY_DELAYS_MS
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

/// Running poller. Dropping it also stops the task, without waiting for it to finish.
pub struct PollerHandle {
    view: watch::Receiver<ViewState>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Subscribe to view updates.
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }

    /// Stop polling; a poll still in flight is abandoned and never applied.
    pub async fn cancel(self) {
        let _ = self.cancel.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "poller task ended abnormally");
        }
    }
}

/// Start polling `source` on the configured cadence.
pub fn spawn<S: TimerSource>(source: S, config: PollerConfig) -> PollerHandle {
    let (view_tx, view_rx) = watch::channel(ViewState::default());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task = tokio::spawn(run(Arc::new(source), config, view_tx, cancel_rx));
    PollerHandle {
        view: view_rx,
        cancel: cancel_tx,
        task,
    }
}

async fn run<S: TimerSource>(
    source: Arc<S>,
    config: PollerConfig,
    view_tx: watch::Sender<ViewState>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            outcome = fetch_with_retry(source.as_ref(), &config.retry_delays) => outcome,
        };

        match outcome {
            Ok(snapshot) => view_tx.send_modify(|current| {
                if !view::is_newer(current, &snapshot) {
                    debug!(
                        phase_end_at_ms = snapshot.phase_end_at_ms,
                        version = snapshot.version,
                        "ignoring stale timer snapshot"
                    );
                }
                *current = view::apply_snapshot(current, snapshot);
            }),
            Err(err) => {
                warn!(error = %err, "timer poll failed; keeping last known state");
                view_tx.send_modify(|current| *current = view::apply_failure(current, &err));
            }
        }
    }

    info!("timer poller stopped");
}

/// Resolve once cancellation is requested or the handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn fetch_with_retry<S: TimerSource>(
    source: &S,
    delays: &[Duration],
) -> Result<TimerResponse, ClientError> {
    let mut attempt = 0;
    loop {
        match source.fetch_timer().await {
            Ok(snapshot) => return Ok(snapshot),
            Err(err) => {
                let Some(delay) = delays.get(attempt) else {
                    return Err(err);
                };
                attempt += 1;
                debug!(error = %err, attempt, ?delay, "timer poll failed; retrying");
                sleep(*delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use futures::future::{self, BoxFuture};

    use super::*;
    use crate::client::view::tests::snapshot;

    struct ScriptedSource {
        script: Mutex<VecDeque<Option<Result<TimerResponse, ClientError>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Option<Result<TimerResponse, ClientError>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn unavailable() -> Option<Result<TimerResponse, ClientError>> {
        Some(Err(ClientError::Status {
            status: 503,
            message: "storage unavailable".into(),
        }))
    }

    impl TimerSource for Arc<ScriptedSource> {
        fn fetch_timer(&self) -> BoxFuture<'static, Result<TimerResponse, ClientError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // An exhausted script or an explicit `None` never answers.
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(result) => Box::pin(future::ready(result)),
                None => Box::pin(future::pending()),
            }
        }
    }

    fn fast_config() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(2),
            retry_delays: vec![Duration::from_millis(10), Duration::from_millis(20)],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_a_snapshot_arrives() {
        let source = ScriptedSource::new(vec![
            unavailable(),
            unavailable(),
            Some(Ok(snapshot(5_000, 1))),
        ]);
        let handle = spawn(source.clone(), fast_config());

        let mut view = handle.view();
        let state = view.wait_for(|v| v.timer.is_some()).await.unwrap().clone();
        assert!(state.online);
        assert_eq!(state.failed_polls, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        handle.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back_to_last_known_state() {
        let source = ScriptedSource::new(vec![
            Some(Ok(snapshot(5_000, 1))),
            unavailable(),
            unavailable(),
            unavailable(),
        ]);
        let handle = spawn(source.clone(), fast_config());

        let mut view = handle.view();
        let state = view.wait_for(|v| v.failed_polls == 1).await.unwrap().clone();
        assert!(!state.online);
        assert_eq!(state.timer.map(|t| t.phase_end_at_ms), Some(5_000));
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);

        handle.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_is_not_applied() {
        let source = ScriptedSource::new(vec![
            Some(Ok(snapshot(9_000, 2))),
            Some(Ok(snapshot(4_000, 7))),
        ]);
        let handle = spawn(source.clone(), fast_config());

        let mut view = handle.view();
        view.wait_for(|v| v.timer.is_some()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        let state = view.borrow().clone();
        assert_eq!(state.timer.map(|t| t.phase_end_at_ms), Some(9_000));

        handle.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_abandons_poll_in_flight() {
        let source = ScriptedSource::new(vec![None]);
        let handle = spawn(source.clone(), fast_config());
        let view = handle.view();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        handle.cancel().await;
        assert!(view.borrow().timer.is_none());
        assert_eq!(view.borrow().failed_polls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let source = ScriptedSource::new(vec![None]);
        let handle = spawn(source.clone(), fast_config());
        let mut view = handle.view();

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(handle);

        // The task owns the only view sender, so the channel closes once it exits.
        let closed = tokio::time::timeout(Duration::from_secs(10), view.changed()).await;
        assert!(matches!(closed, Ok(Err(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}

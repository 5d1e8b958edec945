//! Tracking Controller: keeps the remote running activity in line with the cube
//!
//! The controller consumes stable face events one at a time, in arrival order.
//! Each event maps to a desired state (a task, or idle) and, when that differs
//! from what the controller believes is running, drives the session client.
//! A failed transition leaves the believed state untouched and is re-attempted
//! on the next event or the next reconciliation tick.

use log::{debug, error, info, warn};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_RECONCILE, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::error::Result;
use crate::models::{StableFaceEvent, TaskId, TaskMapping};
use crate::session::SessionApi;

/// What the controller believes is running remotely
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CurrentTask {
    #[default]
    Idle,
    Tracking(TaskId),
}

impl CurrentTask {
    pub fn task(&self) -> Option<&TaskId> {
        match self {
            CurrentTask::Tracking(task) => Some(task),
            CurrentTask::Idle => None,
        }
    }
}

impl fmt::Display for CurrentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentTask::Idle => write!(f, "idle"),
            CurrentTask::Tracking(task) => write!(f, "{}", task),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// How often a failed transition is re-attempted without a new event
    pub reconcile_interval: Duration,
    /// Upper bound on the best-effort stop at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            reconcile_interval: DEFAULT_RECONCILE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Desired state already held; nothing was sent
    Unchanged,
    Started(TaskId),
    Stopped,
    /// The remote call failed; the desired state is pending
    Failed,
}

pub struct TrackingController<S: SessionApi> {
    session: S,
    mapping: TaskMapping,
    options: ControllerOptions,
    current: CurrentTask,
    // Desired state whose transition failed and still needs applying
    pending: Option<CurrentTask>,
}

impl<S: SessionApi> TrackingController<S> {
    pub fn new(session: S, mapping: TaskMapping, options: ControllerOptions) -> Self {
        Self {
            session,
            mapping,
            options,
            current: CurrentTask::Idle,
            pending: None,
        }
    }

    pub fn current(&self) -> &CurrentTask {
        &self.current
    }

    pub fn pending(&self) -> Option<&CurrentTask> {
        self.pending.as_ref()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Map a face event to its desired state and apply it
    pub async fn handle_event(&mut self, event: StableFaceEvent) -> Transition {
        let desired = match self.mapping.task_for(event.face) {
            Some(task) => CurrentTask::Tracking(task.clone()),
            None => CurrentTask::Idle,
        };
        debug!("{} selects {}", event.face, desired);
        self.apply(desired).await
    }

    /// Re-attempt a pending transition, if there is one
    pub async fn reconcile(&mut self) -> Option<Transition> {
        let desired = self.pending.clone()?;
        info!("Reconciling: retrying transition to {}", desired);
        Some(self.apply(desired).await)
    }

    async fn apply(&mut self, desired: CurrentTask) -> Transition {
        // After a failure the remote side may not match `current`; re-assert it
        let settled = desired == self.current;
        if settled && self.pending.is_none() {
            return Transition::Unchanged;
        }

        let result = match &desired {
            CurrentTask::Tracking(task) => self
                .session
                .start_activity(task)
                .await
                .map(|_| Transition::Started(task.clone())),
            CurrentTask::Idle => self.session.stop_activity().await.map(|_| Transition::Stopped),
        };

        match result {
            Ok(_) if settled => {
                debug!("Back to {}", desired);
                self.pending = None;
                Transition::Unchanged
            }
            Ok(transition) => {
                info!("Now tracking: {}", desired);
                self.current = desired;
                self.pending = None;
                transition
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!("Could not switch to {}: {}; will retry", desired, e);
                } else {
                    error!("Could not switch to {}: {}", desired, e);
                }
                self.pending = Some(desired);
                Transition::Failed
            }
        }
    }

    /// Best-effort stop of the running task, bounded by the shutdown timeout
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.current == CurrentTask::Idle {
            return Ok(());
        }

        info!("Stopping {} before exit", self.current);
        match tokio::time::timeout(self.options.shutdown_timeout, self.session.stop_activity()).await {
            Ok(Ok(())) => {
                self.current = CurrentTask::Idle;
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Could not stop {} on shutdown: {}", self.current, e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Stopping {} timed out after {:?}",
                    self.current, self.options.shutdown_timeout
                );
                Ok(())
            }
        }
    }

    /// Process events until cancelled or the event source ends, then shut down
    pub async fn run(&mut self, mut events: mpsc::Receiver<StableFaceEvent>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.options.reconcile_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                    }
                    None => {
                        info!("Orientation stream closed");
                        break;
                    }
                },
                _ = tick.tick() => {
                    self.reconcile().await;
                }
            }
        }

        if let Err(e) = self.shutdown().await {
            debug!("Shutdown cleanup failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::models::{Face, Session};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start(String),
        Stop,
    }

    /// Session double that records calls and fails on demand
    #[derive(Default)]
    struct RecordingSession {
        calls: Vec<Call>,
        failures: VecDeque<bool>,
        running: Option<TaskId>,
        hang_on_stop: bool,
    }

    impl RecordingSession {
        fn fail_next(&mut self, n: usize) {
            for _ in 0..n {
                self.failures.push_back(true);
            }
        }

        fn next_fails(&mut self) -> bool {
            self.failures.pop_front().unwrap_or(false)
        }
    }

    fn unavailable() -> BridgeError {
        BridgeError::RemoteUnavailable {
            operation: "start activity".into(),
            attempts: 3,
            reason: "timeout".into(),
        }
    }

    #[async_trait]
    impl SessionApi for RecordingSession {
        async fn start_activity(&mut self, task: &TaskId) -> Result<Session> {
            self.calls.push(Call::Start(task.name.clone()));
            if self.next_fails() {
                return Err(unavailable());
            }
            self.running = Some(task.clone());
            Ok(Session::Running {
                task: task.clone(),
                activity_id: 1,
                started_at: Utc::now(),
            })
        }

        async fn stop_activity(&mut self) -> Result<()> {
            self.calls.push(Call::Stop);
            if self.hang_on_stop {
                std::future::pending::<()>().await;
            }
            if self.next_fails() {
                return Err(unavailable());
            }
            self.running = None;
            Ok(())
        }
    }

    fn mapping() -> TaskMapping {
        TaskMapping::new()
            .with(Face(1), TaskId::new("A", 1, ""))
            .with(Face(2), TaskId::new("B", 2, ""))
    }

    fn controller() -> TrackingController<RecordingSession> {
        TrackingController::new(RecordingSession::default(), mapping(), ControllerOptions::default())
    }

    fn event(face: u8) -> StableFaceEvent {
        StableFaceEvent::new(Face(face), Instant::now())
    }

    fn start(name: &str) -> Call {
        Call::Start(name.to_string())
    }

    #[tokio::test]
    async fn test_initial_state_is_idle_without_calls() {
        let c = controller();
        assert_eq!(*c.current(), CurrentTask::Idle);
        assert!(c.session().calls.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_start_stop_start() {
        let mut c = controller();
        for face in [1, 1, 3, 2] {
            c.handle_event(event(face)).await;
        }
        assert_eq!(c.session().calls, vec![start("A"), Call::Stop, start("B")]);
        assert_eq!(c.current().task().map(|t| t.name.as_str()), Some("B"));
    }

    #[tokio::test]
    async fn test_repeated_face_starts_once() {
        let mut c = controller();
        assert_eq!(c.handle_event(event(1)).await, Transition::Started(TaskId::new("A", 1, "")));
        assert_eq!(c.handle_event(event(1)).await, Transition::Unchanged);
        assert_eq!(c.session().calls, vec![start("A")]);
    }

    #[tokio::test]
    async fn test_unmapped_face_while_idle_does_nothing() {
        let mut c = controller();
        assert_eq!(c.handle_event(event(7)).await, Transition::Unchanged);
        assert_eq!(c.handle_event(event(0)).await, Transition::Unchanged);
        assert!(c.session().calls.is_empty());
    }

    #[tokio::test]
    async fn test_faces_sharing_a_task_do_not_restart_it() {
        let mapping = mapping().with(Face(5), TaskId::new("A-again", 1, ""));
        let mut c = TrackingController::new(RecordingSession::default(), mapping, ControllerOptions::default());
        c.handle_event(event(1)).await;
        assert_eq!(c.handle_event(event(5)).await, Transition::Unchanged);
        assert_eq!(c.session().calls, vec![start("A")]);
    }

    #[tokio::test]
    async fn test_failed_start_keeps_state_and_retries_on_same_face() {
        let mut c = controller();
        c.session.fail_next(1);
        assert_eq!(c.handle_event(event(1)).await, Transition::Failed);
        assert_eq!(*c.current(), CurrentTask::Idle);
        assert!(c.pending().is_some());

        assert!(matches!(c.handle_event(event(1)).await, Transition::Started(_)));
        assert_eq!(c.session().calls, vec![start("A"), start("A")]);
        assert!(c.pending().is_none());
    }

    #[tokio::test]
    async fn test_failed_stop_keeps_task() {
        let mut c = controller();
        c.handle_event(event(1)).await;
        c.session.fail_next(1);
        assert_eq!(c.handle_event(event(4)).await, Transition::Failed);
        assert_eq!(c.current().task().map(|t| t.name.as_str()), Some("A"));
        assert_eq!(c.reconcile().await, Some(Transition::Stopped));
        assert_eq!(*c.current(), CurrentTask::Idle);
    }

    #[tokio::test]
    async fn test_reconcile_without_pending_is_quiet() {
        let mut c = controller();
        c.handle_event(event(1)).await;
        assert_eq!(c.reconcile().await, None);
        assert_eq!(c.session().calls, vec![start("A")]);
    }

    #[tokio::test]
    async fn test_returning_to_current_face_clears_pending() {
        let mut c = controller();
        c.handle_event(event(1)).await;
        c.session.fail_next(1);
        c.handle_event(event(2)).await;
        assert!(c.pending().is_some());
        assert_eq!(c.handle_event(event(1)).await, Transition::Unchanged);
        assert!(c.pending().is_none());
        // The current task is re-asserted once, then settled faces are quiet
        assert_eq!(c.session().calls, vec![start("A"), start("B"), start("A")]);
        assert_eq!(c.handle_event(event(1)).await, Transition::Unchanged);
        assert_eq!(c.session().calls.len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_task() {
        let mut c = controller();
        c.handle_event(event(2)).await;
        c.shutdown().await.unwrap();
        assert_eq!(c.session().calls, vec![start("B"), Call::Stop]);
        assert_eq!(*c.current(), CurrentTask::Idle);
    }

    #[tokio::test]
    async fn test_activity_running_elsewhere_is_left_alone() {
        // The session already runs something started outside the bridge
        let mut session = RecordingSession::default();
        session.running = Some(TaskId::new("elsewhere", 99, ""));
        let mut c = TrackingController::new(session, mapping(), ControllerOptions::default());
        assert_eq!(*c.current(), CurrentTask::Idle);

        assert_eq!(c.handle_event(event(7)).await, Transition::Unchanged);
        c.shutdown().await.unwrap();
        assert!(c.session().calls.is_empty());
        assert!(c.session().running.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_when_idle_makes_no_call() {
        let mut c = controller();
        c.shutdown().await.unwrap();
        assert!(c.session().calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_bounded() {
        let mut c = TrackingController::new(
            RecordingSession::default(),
            mapping(),
            ControllerOptions {
                reconcile_interval: Duration::from_secs(60),
                shutdown_timeout: Duration::from_secs(5),
            },
        );
        c.handle_event(event(1)).await;
        c.session.hang_on_stop = true;
        assert!(c.shutdown().await.is_ok());
        assert_eq!(c.session().calls.last(), Some(&Call::Stop));
    }

    #[tokio::test]
    async fn test_run_processes_in_order_then_cleans_up() {
        let (tx, rx) = mpsc::channel(8);
        for face in [1, 3, 2] {
            tx.send(event(face)).await.unwrap();
        }
        drop(tx);

        let mut c = controller();
        c.run(rx, CancellationToken::new()).await;
        assert_eq!(
            c.session().calls,
            vec![start("A"), Call::Stop, start("B"), Call::Stop]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reconciles_on_tick() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let mut c = TrackingController::new(
            RecordingSession::default(),
            mapping(),
            ControllerOptions {
                reconcile_interval: Duration::from_secs(10),
                shutdown_timeout: Duration::from_secs(1),
            },
        );
        c.session.fail_next(1);
        tx.send(event(1)).await.unwrap();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            stopper.cancel();
        });
        c.run(rx, cancel).await;
        drop(tx);

        // Failed start, tick retry, then the stop on shutdown
        assert_eq!(c.session().calls, vec![start("A"), start("A"), Call::Stop]);
    }
}

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use common::storage::types::test_session::SessionStatus;
use tokio::sync::watch;
use tracing::{debug, info};

struct RunningSimulation {
    session_id: String,
    stop_flag: Arc<AtomicBool>,
    finished: bool,
    // Closed when the run's ticket is dropped.
    exited: watch::Receiver<()>,
}

#[derive(Default)]
struct RegistryState {
    runs: HashMap<String, RunningSimulation>,
    // Sessions with at least one failed run among those still registered.
    failed_sessions: HashSet<String>,
}

/// The simulations currently running, keyed by conversation id.
#[derive(Clone, Default)]
pub struct SimulationRegistry {
    state: Arc<Mutex<RegistryState>>,
}

/// Held by a running simulation task. Dropping it unregisters the run and
/// wakes everyone waiting in [`SimulationRegistry::wait_for_exit`].
pub struct RunTicket {
    conversation_id: String,
    stop_flag: Arc<AtomicBool>,
    registry: SimulationRegistry,
    _exited: watch::Sender<()>,
}

impl RunTicket {
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop_flag
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.registry.lock().runs.remove(&self.conversation_id);
        debug!(conversation_id = %self.conversation_id, "Released simulation");
    }
}

impl SimulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a run and returns the ticket its task keeps until it exits.
    pub fn register(&self, conversation_id: &str, session_id: &str) -> RunTicket {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited_rx) = watch::channel(());
        self.lock().runs.insert(
            conversation_id.to_string(),
            RunningSimulation {
                session_id: session_id.to_string(),
                stop_flag: Arc::clone(&stop_flag),
                finished: false,
                exited: exited_rx,
            },
        );
        debug!(conversation_id, session_id, "Registered simulation");
        RunTicket {
            conversation_id: conversation_id.to_string(),
            stop_flag,
            registry: self.clone(),
            _exited: exited_tx,
        }
    }

    /// Signals the runner to stop after its current turn. Returns false when
    /// nothing is running under that id.
    pub fn stop(&self, conversation_id: &str) -> bool {
        let state = self.lock();
        match state.runs.get(conversation_id) {
            Some(run) if !run.finished => {
                run.stop_flag.store(true, Ordering::SeqCst);
                info!(conversation_id, "Stop requested for simulation");
                true
            }
            _ => false,
        }
    }

    /// Marks a run as done. Returns the status its session should take when
    /// this was the session's last unfinished run, `None` while others of the
    /// same session are still going.
    pub fn finish(&self, conversation_id: &str, failed: bool) -> Option<SessionStatus> {
        let mut state = self.lock();
        let session_id = match state.runs.get_mut(conversation_id) {
            Some(run) => {
                run.finished = true;
                run.session_id.clone()
            }
            None => return None,
        };
        if failed {
            state.failed_sessions.insert(session_id.clone());
        }

        let others_running = state
            .runs
            .values()
            .any(|run| run.session_id == session_id && !run.finished);
        if others_running {
            return None;
        }

        if state.failed_sessions.remove(&session_id) {
            Some(SessionStatus::Failed)
        } else {
            Some(SessionStatus::Completed)
        }
    }

    /// Resolves once the run has exited, immediately when it is not registered.
    pub async fn wait_for_exit(&self, conversation_id: &str) {
        let exited = self
            .lock()
            .runs
            .get(conversation_id)
            .map(|run| run.exited.clone());
        if let Some(mut exited) = exited {
            while exited.changed().await.is_ok() {}
        }
    }

    pub fn is_running(&self, conversation_id: &str) -> bool {
        self.lock()
            .runs
            .get(conversation_id)
            .is_some_and(|run| !run.finished)
    }

    pub fn running_count(&self) -> usize {
        self.lock().runs.values().filter(|run| !run.finished).count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_stop_sets_the_registered_flag() {
        let registry = SimulationRegistry::new();
        let ticket = registry.register("c1", "s1");
        assert!(registry.is_running("c1"));
        assert!(!ticket.stop_flag().load(Ordering::SeqCst));

        assert!(registry.stop("c1"));
        assert!(ticket.stop_flag().load(Ordering::SeqCst));

        assert_eq!(registry.finish("c1", false), Some(SessionStatus::Completed));
        assert!(!registry.is_running("c1"));
        assert!(!registry.stop("c1"));

        drop(ticket);
        assert_eq!(registry.running_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SimulationRegistry::new();
        let clone = registry.clone();
        let _a = registry.register("a", "s1");
        let _b = registry.register("b", "s1");
        assert_eq!(clone.running_count(), 2);
        assert!(clone.stop("b"));
    }

    #[test]
    fn test_only_last_run_of_a_session_settles_status() {
        let registry = SimulationRegistry::new();
        let _a = registry.register("a", "s1");
        let _b = registry.register("b", "s1");
        let _c = registry.register("c", "s2");

        assert_eq!(registry.finish("a", true), None);
        assert_eq!(registry.finish("c", false), Some(SessionStatus::Completed));
        assert_eq!(registry.finish("b", false), Some(SessionStatus::Failed));
        assert_eq!(registry.finish("missing", false), None);
    }

    #[tokio::test]
    async fn test_wait_for_exit_resolves_when_ticket_drops() {
        let registry = SimulationRegistry::new();
        registry.wait_for_exit("nothing").await;

        let ticket = registry.register("c1", "s1");
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(ticket);
        });

        registry.wait_for_exit("c1").await;
        assert_eq!(registry.running_count(), 0);
        task.await.unwrap();
    }
}

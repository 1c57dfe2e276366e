//! Command queue
//!
//! Every intent directed at a running session goes through a single
//! unbounded FIFO consumed by the coordinator loop. Producers (UI actions,
//! monitors, the interface builder hand-off) hold a cloned [`CommandQueue`]
//! and never touch session state directly.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use tk_core::{ResourceEnablement, ResourceId, TunDescriptor};

use crate::interface::AppRules;

/// Outbound intent for the running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the engine to end the session
    Disconnect,
    /// Replace the engine's disabled-resource set
    SetDisabledResources(BTreeSet<ResourceId>),
    /// Replace the engine's upstream DNS servers
    SetDns(Vec<String>),
    /// Replace the engine's log directives
    SetLogDirectives(String),
    /// Hand a freshly established interface to the engine
    SetTunDescriptor(TunDescriptor),
    /// Force the engine to reconnect
    Reset(String),
    /// User toggled the internet resource
    SetEnablement(ResourceEnablement),
    /// Managed per-application rules changed
    UpdateAppRules(AppRules),
}

impl Command {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Disconnect => "Disconnect",
            Command::SetDisabledResources(_) => "SetDisabledResources",
            Command::SetDns(_) => "SetDns",
            Command::SetLogDirectives(_) => "SetLogDirectives",
            Command::SetTunDescriptor(_) => "SetTunDescriptor",
            Command::Reset(_) => "Reset",
            Command::SetEnablement(_) => "SetEnablement",
            Command::UpdateAppRules(_) => "UpdateAppRules",
        }
    }
}

/// Receiving end handed to the coordinator loop
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Shared handle to the command queue of the active session.
///
/// Cloning is cheap; all clones talk to the same queue. While no session is
/// active, enqueued commands are logged and dropped.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
}

impl CommandQueue {
    /// Create an inactive queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh queue for a new session and return its single receiver.
    ///
    /// Any previous receiver observes its queue as closed.
    pub fn activate(&self) -> CommandReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(tx);
        rx
    }

    /// Close the queue; later commands are dropped
    pub fn deactivate(&self) {
        self.lock().take();
    }

    /// Whether a session currently accepts commands
    pub fn is_active(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Enqueue a command without blocking.
    ///
    /// Returns whether the command was accepted. Callers are free to ignore
    /// the result: a dropped command has already been logged.
    pub fn enqueue(&self, command: Command) -> bool {
        let name = command.name();
        let guard = self.lock();
        let Some(tx) = guard.as_ref() else {
            tracing::debug!("Cannot send {}: no active session", name);
            return false;
        };

        match tx.send(command) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Cannot send {}: session queue closed", name);
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Command>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_queue_drops_commands() {
        let queue = CommandQueue::new();
        assert!(!queue.is_active());
        assert!(!queue.enqueue(Command::SetDns(vec!["1.1.1.1".to_string()])));
        assert!(!queue.enqueue(Command::Disconnect));
    }

    #[tokio::test]
    async fn test_fifo_across_producers() {
        let queue = CommandQueue::new();
        let mut rx = queue.activate();
        let other = queue.clone();

        assert!(queue.enqueue(Command::Reset("roam".to_string())));
        assert!(other.enqueue(Command::SetLogDirectives("debug".to_string())));
        assert!(queue.enqueue(Command::Disconnect));

        assert_eq!(rx.recv().await, Some(Command::Reset("roam".to_string())));
        assert_eq!(
            rx.recv().await,
            Some(Command::SetLogDirectives("debug".to_string()))
        );
        assert_eq!(rx.recv().await, Some(Command::Disconnect));
    }

    #[tokio::test]
    async fn test_deactivate_closes_receiver() {
        let queue = CommandQueue::new();
        let mut rx = queue.activate();
        queue.deactivate();

        assert!(!queue.is_active());
        assert!(!queue.enqueue(Command::Disconnect));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_reactivate_closes_previous_receiver() {
        let queue = CommandQueue::new();
        let mut first = queue.activate();
        let mut second = queue.activate();

        assert!(queue.enqueue(Command::Disconnect));
        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, Some(Command::Disconnect));
    }

    #[test]
    fn test_dropped_receiver_marks_inactive() {
        let queue = CommandQueue::new();
        let rx = queue.activate();
        drop(rx);

        assert!(!queue.is_active());
        assert!(!queue.enqueue(Command::Disconnect));
    }

    #[test]
    fn test_enqueue_from_many_threads() {
        let queue = CommandQueue::new();
        let mut rx = queue.activate();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        queue.enqueue(Command::Reset(format!("thread-{}", i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 800);
    }
}

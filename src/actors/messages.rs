//! Message types for actor communication

use tokio::sync::oneshot;

/// Commands that can be sent to a SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run the job immediately, outside the regular interval
    ///
    /// Used for testing and manual triggering.
    TickNow {
        /// Channel to send the job result back
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Stop scheduling. A tick that is already running completes first.
    Shutdown,
}

/// Lifecycle of a scheduler
///
/// `Stopped` is terminal, a stopped scheduler cannot be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Built but its task is not running yet
    Created,

    /// Task running, waiting for the first tick
    Started,

    /// At least one tick has fired
    Running,

    /// No further ticks will fire
    Stopped,
}

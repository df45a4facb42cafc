//! Actor-based scheduling
//!
//! The scheduler runs as an independent async task and is controlled through
//! a cloneable handle over an mpsc command channel.
//!
//! ```text
//!   SchedulerHandle ──commands──▶ SchedulerActor ──every interval──▶ Job::run()
//!         ▲                              │
//!         └──────── watch(state) ◀───────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc channel for control messages (tick now, shutdown)
//! 2. **State**: watch channel publishing the scheduler's lifecycle state
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod scheduler;

// ABOUTME: Library root for convoy: queue, lock, strategies, and their collaborators.
// ABOUTME: The convoy binary in main.rs is a thin CLI over these modules.

pub mod config;
pub mod deploy;
pub mod error;
pub mod health;
pub mod lock;
pub mod orchestrator;
pub mod output;
pub mod queue;
pub mod resilience;
pub mod ssh;
pub mod store;
pub mod target;
pub mod types;
pub mod worker;

//! Execution of a resolved quote: approval, signing, submission and
//! confirmation polling, driven strictly sequentially for one attempt.
//!
//! Cancellation is cooperative: dropping the `execute` future abandons the
//! attempt, but anything already broadcast cannot be retracted and may
//! still confirm on-chain.

pub mod engine;
pub mod machine;

pub use engine::{BridgeConfirmation, EngineOptions, ExecutionEngine, ExecutionOutcome};
pub use machine::{Effect, ExecutionEvent, ExecutionStatus, PollTarget};

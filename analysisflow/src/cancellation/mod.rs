//! Cooperative cancellation.
//!
//! Runs are cancelled by abandonment: in-flight requests are not aborted at
//! the transport level, the orchestrator simply stops awaiting them.

mod token;

pub use token::CancellationToken;

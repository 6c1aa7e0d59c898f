//! Session module - the orchestration loop and its owners
//!
//! - `Session`: runs turns for one conversation (query → tools → answer)
//! - `SessionManager`: keeps one `Session` per id, sharing or isolating
//!   redaction stores according to the configured scope
//! - `TurnEvent` / `TurnOutcome`: progress and results for frontends
//!
//! # Example Usage
//!
//! ```ignore
//! use veil_core::session::Session;
//!
//! let mut session = Session::new(gateway, invoker, codec).with_config(config.orchestration);
//! match session.run_turn("jira tickets assigned to alice@example.com").await {
//!     Ok(outcome) => println!("{}", outcome.render()),
//!     Err(e) => eprintln!("Turn failed: {}", e),
//! }
//! ```

mod manager;
mod orchestrator;
mod types;

pub use manager::{SessionFactory, SessionManager};
pub use orchestrator::Session;
pub use types::{LoopState, SessionId, TurnEvent, TurnOutcome};

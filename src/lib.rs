//! An embeddable test harness driving a deterministic simulated blockchain.
//!
//! The harness owns any number of isolated chain environments, each advanced
//! one block at a time. A block advance can carry a caller transaction or an
//! oracle price injection (never both), and every fallible operation reports
//! recoverable failures through a tagged result buffer while broken-fixture
//! conditions travel as plain `Err` values.
//!
//! Rust callers embed [`Harness`] directly; foreign callers go through the
//! C ABI in [`ffi`], which wraps the same entry points and trades the fatal
//! error channel for a process abort.
//!
//! ```no_run
//! use cw_sandbox::Harness;
//!
//! # fn main() -> anyhow::Result<()> {
//! let harness = Harness::new();
//! let env = harness.create_environment()?;
//! harness.advance_time(env, 3)?;
//! assert_eq!(harness.get_block_height(env)?, 2);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod env;
pub mod ffi;
pub mod harness;
pub mod lifecycle;
pub mod oracle;
pub mod result;

pub use env::{BlockContext, Environment, CHAIN_ID, DEFAULT_BLOCK_SECONDS, GENESIS_TIME_NS};
pub use harness::Harness;
pub use oracle::PriceObservation;
pub use result::{decode as decode_result, ErrorKind, RunnerError};

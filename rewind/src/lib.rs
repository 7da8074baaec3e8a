//! Reversible single-file code mutation.
//!
//! An attempt asks an external generator for new content of one file, writes
//! it, verifies it, and rolls the file back to its prior version if
//! verification does not pass. Uncommitted work found before the attempt is
//! stashed (never silently discarded) and left for the operator to restore.
//!
//! - **[`core`]**: Pure, deterministic logic (attempt state machine, target
//!   normalization, shared types). No I/O.
//! - **[`io`]**: Side-effecting adapters (git, generator and verifier processes,
//!   atomic writes, locking, records). Behind traits where tests substitute fakes.
//!
//! Orchestration modules ([`guard`], [`attempt`], [`rollback`], [`status`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod attempt;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod guard;
pub mod io;
pub mod logging;
pub mod rollback;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

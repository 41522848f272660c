//! Stages a file passes through around a conversion job.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ intake ──▶ registry ──▶ (orchestrator) ──▶ ledger
//! (path/URL) (filter)   (ordered)      (backend)        (download/ZIP)
//! ```
//!
//! 1. [`input`]: resolve a CLI path or URL into a candidate entry
//! 2. [`intake`]: classify candidates by size and type; pure
//! 3. [`registry`]: the ordered working set the user edits
//! 4. [`ledger`]: artifacts of the latest job and their delivery
//!
//! The orchestrator between registry and ledger lives in
//! [`crate::orchestrator`] because it owns the async job state.

pub mod input;
pub mod intake;
pub mod ledger;
pub mod registry;

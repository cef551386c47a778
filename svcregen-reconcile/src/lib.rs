//! # svcregen-reconcile
//!
//! Service registry reconciliation and the regeneration hook stages.
//!
//! Call [`reconcile`] to merge a baseline into a registry in memory, or
//! [`hook::run`] to execute one orchestrator invocation end to end.

pub mod error;
pub mod hook;
pub mod reconciler;

pub use error::HookError;
pub use hook::{run, HookOutcome, Invocation, PreOutcome, Stage};
pub use reconciler::{reconcile, Change, Reconciliation};

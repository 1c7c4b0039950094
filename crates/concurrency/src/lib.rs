//! Ordering for Tally
//!
//! The [`DecisionMaker`] is the single writer path's entry point: it assigns
//! each admitted [`RequestContext`] the next sequence and hands the resulting
//! decision to the book keeper.

#![warn(clippy::all)]

pub mod context;
pub mod decision;

pub use context::RequestContext;
pub use decision::DecisionMaker;

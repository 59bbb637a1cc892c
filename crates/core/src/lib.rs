//! `fiscalpos-core` — shared building blocks for the compliance core.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): the
//! outward error taxonomy and the clock used to evaluate date-bound rules.

pub mod clock;
pub mod error;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ComplianceError, ComplianceResult};

//! Fiscal numbering domain module (NCF).
//!
//! This crate contains the rules for DGII fiscal document numbers: document
//! types, the fixed-width number format, and per-type issuance rules
//! (activation, expiry, exhaustion). Pure domain logic (no IO, no storage).

pub mod ncf_type;
pub mod number;
pub mod sequence;

pub use ncf_type::NcfType;
pub use number::{NcfNumber, MAX_ORDINAL, NCF_LEN, ORDINAL_DIGITS, PREFIX_LEN};
pub use sequence::{
    days_until, default_expiry, validate_ceiling, ExpirationInfo, NcfSequence, SequenceInfo,
};

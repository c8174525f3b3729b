//! Attribute-Value Pair codec.
//!
//! Internals are split the way the rest of this crate splits a
//! concern into a descriptor table, the raw codec, and the closed
//! enumerations it's built from: no API stability promised across these
//! three files individually, only through what's re-exported here.

mod codec;
mod table;
mod types;

pub use codec::{Avp, ResultCodeAvp};
pub use types::{
    AttributeType, CdnResult, ErrorCode, MessageTypeCode, PayloadSemantic, StopCcnResult,
};

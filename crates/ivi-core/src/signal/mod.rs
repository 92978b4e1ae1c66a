//! Signal domain module.
//!
//! # Module Structure
//!
//! - `value`: wire string <-> typed value codec (`SignalValue`)
//! - `record`: latest value for one path (`SignalRecord`)
//! - `connection`: connection lifecycle (`ConnectionState`, `LinkStatus`)

mod connection;
mod record;
mod value;

pub use connection::{ConnectionState, LinkStatus};
pub use record::SignalRecord;
pub use value::SignalValue;

/// Snapshot of every known signal, keyed by path.
pub type SignalMap = std::collections::HashMap<String, SignalRecord>;

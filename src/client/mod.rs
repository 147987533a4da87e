//! Requester side: sending readout and subscription requests, correlating
//! pushes by sequence number, and local timeout handling.

mod client;
mod record;

pub use client::*;
pub use record::ReadoutState;
pub use record::ReadoutUpdate;
pub(crate) use record::ReadoutRecord;

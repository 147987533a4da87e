//! Responder side: request handling, scheduled readout jobs, chunked
//! result streaming, and event subscriptions.

mod queue;
mod server;
mod subscription;

pub use server::*;
pub(crate) use queue::*;
pub(crate) use subscription::*;

#[cfg(test)]
mod server_test;

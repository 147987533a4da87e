mod client;
mod config;
mod constants;
mod errors;
mod export;
mod fields;
mod request;
mod server;
mod transport;
mod wire;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use export::*;
pub use fields::*;
pub use request::*;
pub use server::*;
pub use transport::*;
pub use wire::*;

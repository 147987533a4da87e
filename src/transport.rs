//! Collaborator seams: the message channel, provisioning, presence and the
//! device data source are all injected behind traits so the engine stays
//! independent of any concrete connection stack.

use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::errors::Result;
use crate::export::SensorDataExport;
use crate::request::ReadoutRequest;

/// Address of a remote peer. The full form may carry a resource suffix
/// (`account@host/resource`); registries key on the lower-cased bare form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        PeerAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address without its resource suffix.
    pub fn bare(&self) -> &str {
        match self.0.split_once('/') {
            Some((bare, _)) => bare,
            None => &self.0,
        }
    }

    /// Canonical registry key: lower-cased bare address.
    pub fn key(&self) -> String {
        self.bare().to_lowercase()
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(s: &str) -> Self {
        PeerAddress(s.to_string())
    }
}

impl From<String> for PeerAddress {
    fn from(s: String) -> Self {
        PeerAddress(s)
    }
}

/// Outcome of an iq round trip: either the result payload or the text of
/// the error stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IqOutcome {
    Result(String),
    Error(String),
}

/// Message channel to remote peers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Sends an iq request and awaits the matching result or error.
    async fn send_request(
        &self,
        to: &PeerAddress,
        payload: String,
    ) -> Result<IqOutcome>;

    /// Sends a one-way push.
    async fn send_message(
        &self,
        to: &PeerAddress,
        payload: String,
    ) -> Result<()>;
}

/// Decision of the provisioning layer for a readout request.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// Access granted; the carried request may be narrower than the one
    /// asked for.
    Granted(ReadoutRequest),
    Denied(String),
}

/// Access control for readouts and subscriptions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioning: Send + Sync {
    async fn can_read(
        &self,
        request: &ReadoutRequest,
        peer: &PeerAddress,
    ) -> Authorization;
}

/// Roster and presence standing of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactState {
    /// Both sides accept each other's subscriptions.
    pub mutual: bool,
    pub online: bool,
}

/// Roster/presence lookups used before sending event pushes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn contact_state(
        &self,
        peer: &PeerAddress,
    ) -> ContactState;
}

/// Device data acquisition. Runs synchronously on a blocking worker; the
/// implementation streams everything the request matches into the sink.
#[cfg_attr(test, automock)]
pub trait ReadoutSource: Send + Sync {
    fn read(
        &self,
        request: &ReadoutRequest,
        sink: &mut dyn SensorDataExport,
    ) -> Result<()>;
}

// -
// Protocol namespaces

/// Namespace of readout requests, field payloads and readout pushes.
pub(crate) const NS_SENSORDATA: &str = "urn:xmpp:iot:sensordata";

/// Namespace of event subscription requests.
pub(crate) const NS_EVENTS: &str = "urn:xmpp:iot:events";

/// Default byte threshold after which a fields payload is partitioned into
/// a new chunk.
pub(crate) const DEFAULT_PARTITION_THRESHOLD: usize = 5000;

/// Period of the requester-side expiry sweep.
pub(crate) const TIMEOUT_SWEEP_INTERVAL_MS: u64 = 1000;

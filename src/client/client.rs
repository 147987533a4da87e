use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::client::ReadoutRecord;
use crate::client::ReadoutState;
use crate::client::ReadoutUpdate;
use crate::config::ClientConfig;
use crate::errors::ProtocolError;
use crate::errors::Result;
use crate::request::FieldCondition;
use crate::request::ReadoutRequest;
use crate::transport::IqOutcome;
use crate::transport::PeerAddress;
use crate::transport::PeerChannel;
use crate::wire::cancel_stanza;
use crate::wire::parse_ack;
use crate::wire::parse_message;
use crate::wire::req_stanza;
use crate::wire::subscribe_stanza;
use crate::wire::unsubscribe_stanza;
use crate::wire::IqAck;
use crate::wire::PushMessage;

/// Subscription parameters beyond the readout filter itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionOptions {
    /// Caller-chosen sequence number; auto-allocated when absent
    pub seqnr: Option<u32>,
    /// Oldest acceptable age of cached values
    pub max_age: Option<chrono::Duration>,
    /// Floor on the time between event pushes
    pub min_interval: Option<chrono::Duration>,
    /// Ceiling after which a push is owed even without a trigger
    pub max_interval: Option<chrono::Duration>,
    /// Ask for an immediate readout when the subscription is accepted
    pub immediate: bool,
}

/// Requester side of the engine.
///
/// Sends readout and subscription requests, correlates the asynchronous
/// pushes coming back by sequence number, and reports progress on the
/// per-request update channel. Must be created inside a running runtime:
/// the timeout sweeper is spawned on construction.
pub struct ReadoutClient<C>
where
    C: PeerChannel + 'static,
{
    inner: Arc<ClientInner<C>>,
}

impl<C> Clone for ReadoutClient<C>
where
    C: PeerChannel + 'static,
{
    fn clone(&self) -> Self {
        ReadoutClient {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ClientInner<C> {
    channel: Arc<C>,
    config: ClientConfig,
    records: DashMap<u32, ReadoutRecord>,
    next_seqnr: AtomicU32,
    sweep_armed: Notify,
    shutdown: CancellationToken,
}

impl<C> ReadoutClient<C>
where
    C: PeerChannel + 'static,
{
    pub fn new(
        channel: Arc<C>,
        config: ClientConfig,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            channel,
            config,
            records: DashMap::new(),
            next_seqnr: AtomicU32::new(1),
            sweep_armed: Notify::new(),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(sweep_loop(Arc::clone(&inner)));
        ReadoutClient { inner }
    }

    /// Requests a readout from a peer. Progress arrives on `updates`; the
    /// returned sequence number ties those updates to this call.
    ///
    /// A rejection still produces a terminal update before the error
    /// returns, so the update stream is complete either way.
    pub async fn request(
        &self,
        to: &PeerAddress,
        request: ReadoutRequest,
        when: Option<DateTime<Utc>>,
        timeout: Option<Duration>,
        updates: mpsc::UnboundedSender<ReadoutUpdate>,
    ) -> Result<u32> {
        let timeout = timeout.unwrap_or(Duration::from_secs(self.inner.config.default_timeout_secs));
        let seqnr = self.register(to, false, Some(timeout), None, updates)?;
        let payload = req_stanza(seqnr, &request, when);
        self.roundtrip(to, seqnr, payload).await
    }

    /// Subscribes to events from a peer. The subscription never times out
    /// locally; it lives until `unsubscribe` or a rejection. A sequence
    /// number chosen through the options must not already be in use.
    pub async fn subscribe(
        &self,
        to: &PeerAddress,
        request: ReadoutRequest,
        conditions: &[FieldCondition],
        options: SubscriptionOptions,
        updates: mpsc::UnboundedSender<ReadoutUpdate>,
    ) -> Result<u32> {
        for condition in conditions {
            for threshold in [
                condition.changed_by,
                condition.changed_up,
                condition.changed_down,
            ]
            .into_iter()
            .flatten()
            {
                if threshold <= 0.0 {
                    return Err(ProtocolError::InvalidCondition {
                        field: condition.field_name.clone(),
                        reason: "change thresholds must be positive".to_string(),
                    }
                    .into());
                }
            }
        }
        for interval in [options.max_age, options.min_interval, options.max_interval]
            .into_iter()
            .flatten()
        {
            if interval <= chrono::Duration::zero() {
                return Err(
                    ProtocolError::InvalidInterval("intervals must be positive".to_string()).into(),
                );
            }
        }
        if let (Some(min_interval), Some(max_interval)) =
            (options.min_interval, options.max_interval)
        {
            if max_interval < min_interval {
                return Err(ProtocolError::InvalidInterval(
                    "maxInterval must not be shorter than minInterval".to_string(),
                )
                .into());
            }
        }

        let seqnr = self.register(to, true, None, options.seqnr, updates)?;
        let payload = subscribe_stanza(
            seqnr,
            &request,
            conditions,
            options.max_age,
            options.min_interval,
            options.max_interval,
            options.immediate,
        );
        self.roundtrip(to, seqnr, payload).await
    }

    /// Tears down a subscription. The remote acknowledgement is best
    /// effort; the local record is dropped regardless.
    pub async fn unsubscribe(
        &self,
        seqnr: u32,
    ) -> Result<()> {
        let peer = {
            let record = self
                .inner
                .records
                .get(&seqnr)
                .ok_or(ProtocolError::NotASubscription(seqnr))?;
            if !record.is_subscription {
                return Err(ProtocolError::NotASubscription(seqnr).into());
            }
            record.peer.clone()
        };
        self.inner.records.remove(&seqnr);

        if let Err(e) = self
            .inner
            .channel
            .send_request(&peer, unsubscribe_stanza(seqnr))
            .await
        {
            debug!("unsubscribe {} not acknowledged by {}: {}", seqnr, peer, e);
        }
        Ok(())
    }

    /// Cancels an outstanding readout. Emits a terminal `Cancelled` update;
    /// the remote acknowledgement is best effort.
    pub async fn cancel(
        &self,
        seqnr: u32,
    ) -> Result<()> {
        let peer = match self.inner.records.remove(&seqnr) {
            Some((_, mut record)) => {
                record.state = ReadoutState::Cancelled;
                record.emit(seqnr, true, Vec::new(), Vec::new(), None);
                record.peer
            }
            None => return Ok(()),
        };

        if let Err(e) = self
            .inner
            .channel
            .send_request(&peer, cancel_stanza(seqnr))
            .await
        {
            debug!("cancel {} not acknowledged by {}: {}", seqnr, peer, e);
        }
        Ok(())
    }

    /// Feeds one asynchronous push from a peer into the correlation table.
    /// Pushes for unknown sequence numbers or from the wrong peer are
    /// dropped.
    pub fn handle_message(
        &self,
        from: &PeerAddress,
        payload: &str,
    ) -> Result<()> {
        let push = parse_message(payload)?;
        let seqnr = match &push {
            PushMessage::Started { seqnr } => *seqnr,
            PushMessage::Fields(chunk) => chunk.seqnr.unwrap_or(0),
            PushMessage::Failure { seqnr, .. } => *seqnr,
            PushMessage::Done { seqnr } => *seqnr,
        };

        let mut remove = false;
        {
            let mut record = match self.inner.records.get_mut(&seqnr) {
                Some(record) => record,
                None => {
                    debug!("dropping push for unknown seqnr {}", seqnr);
                    return Ok(());
                }
            };
            if record.peer.key() != from.key() {
                warn!(
                    "dropping push for seqnr {} from {}: expected {}",
                    seqnr, from, record.peer
                );
                return Ok(());
            }
            record.touch();

            match push {
                PushMessage::Started { .. } => {
                    record.state = ReadoutState::Started;
                    record.emit(seqnr, false, Vec::new(), Vec::new(), None);
                }
                PushMessage::Fields(chunk) => {
                    let done = chunk.done;
                    record.state = if done && !record.is_subscription {
                        remove = true;
                        ReadoutState::Received
                    } else {
                        ReadoutState::Receiving
                    };
                    record.total_fields += chunk.fields.len();
                    record.emit(seqnr, done, chunk.fields, Vec::new(), None);
                }
                PushMessage::Failure { done, errors, .. } => {
                    if done && !record.is_subscription {
                        remove = true;
                        record.state = ReadoutState::Failure;
                    }
                    record.total_errors += errors.len();
                    record.emit(seqnr, done, Vec::new(), errors, None);
                }
                PushMessage::Done { .. } => {
                    if !record.is_subscription {
                        remove = true;
                        record.state = ReadoutState::Received;
                    }
                    record.emit(seqnr, true, Vec::new(), Vec::new(), None);
                }
            }
        }
        if remove {
            self.inner.records.remove(&seqnr);
        }
        Ok(())
    }

    pub fn outstanding(&self) -> usize {
        self.inner.records.len()
    }

    /// Stops the timeout sweeper and drops every outstanding record.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.records.clear();
    }

    fn register(
        &self,
        to: &PeerAddress,
        is_subscription: bool,
        timeout: Option<Duration>,
        preferred: Option<u32>,
        updates: mpsc::UnboundedSender<ReadoutUpdate>,
    ) -> Result<u32> {
        let seqnr = match preferred {
            Some(seqnr) => seqnr,
            None => self.allocate_seqnr(),
        };
        let record = ReadoutRecord {
            peer: to.clone(),
            state: ReadoutState::WaitingForResponse,
            is_subscription,
            deadline: timeout.map(|t| Instant::now() + t),
            timeout: timeout.unwrap_or_default(),
            total_fields: 0,
            total_errors: 0,
            updates,
        };
        match self.inner.records.entry(seqnr) {
            Entry::Occupied(_) => {
                return Err(ProtocolError::DuplicateSequenceNumber(seqnr).into());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
            }
        }
        self.inner.sweep_armed.notify_one();
        Ok(seqnr)
    }

    fn allocate_seqnr(&self) -> u32 {
        loop {
            let candidate = self.inner.next_seqnr.fetch_add(1, Ordering::Relaxed);
            if candidate != 0 && !self.inner.records.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    async fn roundtrip(
        &self,
        to: &PeerAddress,
        seqnr: u32,
        payload: String,
    ) -> Result<u32> {
        let outcome = match self.inner.channel.send_request(to, payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.inner.records.remove(&seqnr);
                return Err(e);
            }
        };

        let ack = match outcome {
            IqOutcome::Result(body) => match parse_ack(&body) {
                Ok(ack) => ack,
                Err(e) => {
                    self.inner.records.remove(&seqnr);
                    return Err(e);
                }
            },
            IqOutcome::Error(text) => {
                self.reject(seqnr, text.clone());
                return Err(ProtocolError::Rejected(text).into());
            }
        };

        match ack {
            IqAck::Accepted { seqnr: echoed } => {
                if echoed != seqnr {
                    self.inner.records.remove(&seqnr);
                    return Err(ProtocolError::SequenceNumberMismatch {
                        sent: seqnr,
                        received: echoed,
                    }
                    .into());
                }
                if let Some(mut record) = self.inner.records.get_mut(&seqnr) {
                    record.state = ReadoutState::Accepted;
                    record.emit(seqnr, false, Vec::new(), Vec::new(), None);
                }
                Ok(seqnr)
            }
            IqAck::Empty => Ok(seqnr),
            IqAck::Cancelled { .. } => Ok(seqnr),
            IqAck::Rejected { reason } => {
                self.reject(seqnr, reason.clone());
                Err(ProtocolError::Rejected(reason).into())
            }
        }
    }

    fn reject(
        &self,
        seqnr: u32,
        reason: String,
    ) {
        if let Some((_, mut record)) = self.inner.records.remove(&seqnr) {
            record.state = ReadoutState::Rejected;
            record.emit(seqnr, true, Vec::new(), Vec::new(), Some(reason));
        }
    }
}

async fn sweep_loop<C>(inner: Arc<ClientInner<C>>)
where
    C: PeerChannel + 'static,
{
    let interval = Duration::from_millis(inner.config.sweep_interval_ms);
    loop {
        let armed = inner
            .records
            .iter()
            .any(|record| record.deadline.is_some());
        if armed {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => sweep(&inner),
            }
        } else {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = inner.sweep_armed.notified() => {}
            }
        }
    }
    debug!("timeout sweeper stopped");
}

fn sweep<C>(inner: &Arc<ClientInner<C>>)
where
    C: PeerChannel + 'static,
{
    let now = Instant::now();
    let expired: Vec<u32> = inner
        .records
        .iter()
        .filter(|record| record.deadline.map_or(false, |deadline| deadline <= now))
        .map(|record| *record.key())
        .collect();

    for seqnr in expired {
        if let Some((_, mut record)) = inner.records.remove(&seqnr) {
            warn!("readout {} to {} timed out", seqnr, record.peer);
            record.state = ReadoutState::TimedOut;
            record.emit(seqnr, true, Vec::new(), Vec::new(), None);
        }
    }
}

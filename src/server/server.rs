use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::config::ServerConfig;
use crate::errors::Result;
use crate::export::PartitionedExport;
use crate::export::SensorDataExport;
use crate::export::XmlExport;
use crate::request::FieldCondition;
use crate::request::ReadoutRequest;
use crate::server::Condition;
use crate::server::JobQueue;
use crate::server::Subscription;
use crate::transport::Authorization;
use crate::transport::ContactDirectory;
use crate::transport::PeerAddress;
use crate::transport::PeerChannel;
use crate::transport::Provisioning;
use crate::transport::ReadoutSource;
use crate::wire::accepted_payload;
use crate::wire::annotate_fields;
use crate::wire::cancelled_payload;
use crate::wire::done_push;
use crate::wire::failure_push;
use crate::wire::parse_iq;
use crate::wire::started_push;
use crate::wire::IqReject;
use crate::wire::IqRequest;
use crate::wire::ReadoutError;
use crate::Field;
use crate::FieldValue;
use crate::ReadoutType;

/// Identifies an in-flight or scheduled readout: the requesting peer's
/// registry key plus the sequence number it chose.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JobKey {
    peer: String,
    seqnr: u32,
}

enum JobHandle {
    Scheduled(Instant),
    Running { id: u64, token: CancellationToken },
}

/// Responder side of the engine.
///
/// Accepts readout and subscription requests over the peer channel, runs
/// readout jobs against the injected data source on blocking workers, and
/// streams results back as chunked pushes. Must be created inside a running
/// runtime: the scheduled-job dispatcher is spawned on construction.
pub struct ReadoutServer<C, P, D>
where
    C: PeerChannel + 'static,
    P: Provisioning + 'static,
    D: ContactDirectory + 'static,
{
    inner: Arc<ServerInner<C, P, D>>,
}

impl<C, P, D> Clone for ReadoutServer<C, P, D>
where
    C: PeerChannel + 'static,
    P: Provisioning + 'static,
    D: ContactDirectory + 'static,
{
    fn clone(&self) -> Self {
        ReadoutServer {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ServerInner<C, P, D> {
    channel: Arc<C>,
    provisioning: Arc<P>,
    contacts: Arc<D>,
    source: Arc<dyn ReadoutSource>,
    config: ServerConfig,
    jobs: DashMap<JobKey, JobHandle>,
    queue: Arc<JobQueue>,
    subscriptions: DashMap<String, Subscription>,
    momentary_values: DashMap<String, f64>,
    job_permits: Arc<Semaphore>,
    next_job_id: AtomicU64,
}

impl<C, P, D> ReadoutServer<C, P, D>
where
    C: PeerChannel + 'static,
    P: Provisioning + 'static,
    D: ContactDirectory + 'static,
{
    pub fn new(
        channel: Arc<C>,
        provisioning: Arc<P>,
        contacts: Arc<D>,
        source: Arc<dyn ReadoutSource>,
        config: ServerConfig,
    ) -> Self {
        let job_permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        ReadoutServer {
            inner: Arc::new(ServerInner {
                channel,
                provisioning,
                contacts,
                source,
                config,
                jobs: DashMap::new(),
                queue: JobQueue::new(),
                subscriptions: DashMap::new(),
                momentary_values: DashMap::new(),
                job_permits,
                next_job_id: AtomicU64::new(0),
            }),
        }
    }

    /// Handles one iq request payload from a peer. Returns the iq result
    /// payload, or the error to carry back on the error stanza.
    pub async fn handle_iq(
        &self,
        from: &PeerAddress,
        payload: &str,
    ) -> std::result::Result<String, IqReject> {
        let request = parse_iq(payload).map_err(|e| IqReject::bad_request(e.to_string()))?;

        match request {
            IqRequest::Readout {
                seqnr,
                when,
                request,
            } => self.handle_readout(from, seqnr, when, request).await,
            IqRequest::Subscribe {
                seqnr,
                request,
                conditions,
                max_age,
                min_interval,
                max_interval,
                immediate,
            } => {
                self.handle_subscribe(
                    from,
                    seqnr,
                    request,
                    conditions,
                    max_age,
                    min_interval,
                    max_interval,
                    immediate,
                )
                .await
            }
            IqRequest::Unsubscribe { seqnr } => self.handle_unsubscribe(from, seqnr),
            IqRequest::Cancel { seqnr } => self.handle_cancel(from, seqnr),
        }
    }

    async fn handle_readout(
        &self,
        from: &PeerAddress,
        seqnr: u32,
        when: Option<DateTime<Utc>>,
        request: ReadoutRequest,
    ) -> std::result::Result<String, IqReject> {
        let granted = match self.inner.provisioning.can_read(&request, from).await {
            Authorization::Granted(granted) => granted,
            Authorization::Denied(reason) => return Err(IqReject::forbidden(reason)),
        };

        let key = JobKey {
            peer: from.key(),
            seqnr,
        };
        // a reused sequence number replaces the older job
        self.cancel_job(&key);

        let now = Utc::now();
        match when {
            Some(when) if when > now => {
                let delay = (when - now).to_std().unwrap_or_default();
                debug!("scheduling readout for {} (seqnr {}) in {:?}", from, seqnr, delay);
                self.schedule_job(key, from.clone(), seqnr, granted, Instant::now() + delay);
            }
            _ => self.spawn_job(key, from.clone(), seqnr, granted),
        }
        Ok(accepted_payload(seqnr))
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_subscribe(
        &self,
        from: &PeerAddress,
        seqnr: u32,
        request: ReadoutRequest,
        conditions: Vec<FieldCondition>,
        max_age: Option<chrono::Duration>,
        min_interval: Option<chrono::Duration>,
        max_interval: Option<chrono::Duration>,
        immediate: bool,
    ) -> std::result::Result<String, IqReject> {
        for interval in [max_age, min_interval, max_interval].into_iter().flatten() {
            if interval <= chrono::Duration::zero() {
                return Err(IqReject::bad_request("event intervals must be positive"));
            }
        }
        if let (Some(min_interval), Some(max_interval)) = (min_interval, max_interval) {
            if max_interval < min_interval {
                return Err(IqReject::bad_request(
                    "maxInterval must not be shorter than minInterval",
                ));
            }
        }

        let granted = match self.inner.provisioning.can_read(&request, from).await {
            Authorization::Granted(granted) => granted,
            Authorization::Denied(reason) => return Err(IqReject::forbidden(reason)),
        };

        let mut armed: Vec<Condition> = conditions.iter().map(Condition::from_request).collect();
        // last known values stand in for baselines the subscriber omitted; a
        // supplied baseline already a threshold away from the last known
        // value owes an event readout right away
        let mut fire_now = immediate;
        for condition in &mut armed {
            if let Some(value) = self.inner.momentary_values.get(condition.field_name()) {
                condition.seed(*value);
                fire_now |= condition.trigger(*value, false);
            }
        }

        self.inner.subscriptions.insert(
            from.key(),
            Subscription {
                peer: from.clone(),
                seqnr,
                request: granted.clone(),
                conditions: armed,
                min_interval,
                max_interval,
                max_age,
                last_push: Utc::now(),
            },
        );
        debug!("subscription from {} accepted (seqnr {})", from, seqnr);

        if fire_now {
            let key = JobKey {
                peer: from.key(),
                seqnr,
            };
            self.cancel_job(&key);
            self.spawn_job(key, from.clone(), seqnr, granted);
        }
        Ok(accepted_payload(seqnr))
    }

    /// Acknowledges unconditionally with an empty result; an unknown
    /// sequence number just has nothing to remove.
    fn handle_unsubscribe(
        &self,
        from: &PeerAddress,
        seqnr: u32,
    ) -> std::result::Result<String, IqReject> {
        if self
            .inner
            .subscriptions
            .remove_if(&from.key(), |_, sub| sub.seqnr == seqnr)
            .is_some()
        {
            debug!("subscription from {} removed (seqnr {})", from, seqnr);
        }
        Ok(String::new())
    }

    fn handle_cancel(
        &self,
        from: &PeerAddress,
        seqnr: u32,
    ) -> std::result::Result<String, IqReject> {
        self.cancel_job(&JobKey {
            peer: from.key(),
            seqnr,
        });
        Ok(cancelled_payload(seqnr))
    }

    /// Feeds newly sampled momentary values into the subscription machinery.
    /// Each active subscription gets at most one event push per batch.
    pub async fn values_updated(
        &self,
        fields: &[Field],
    ) {
        let mut updates: Vec<(String, f64)> = Vec::new();
        for field in fields {
            if !field.readout_type().contains(ReadoutType::MOMENTARY) {
                continue;
            }
            let value = match field.value() {
                FieldValue::Numeric { value, .. } => *value,
                FieldValue::Integer(value) => *value as f64,
                _ => continue,
            };
            self.inner
                .momentary_values
                .insert(field.field_name().to_string(), value);
            updates.push((field.field_name().to_string(), value));
        }
        if updates.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut owed = Vec::new();
        let mut dropped = Vec::new();

        // contact lookups are async, so never hold map entries across them
        let keys: Vec<String> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            let peer = match self.inner.subscriptions.get(&key) {
                Some(sub) => sub.peer.clone(),
                None => continue,
            };
            let state = self.inner.contacts.contact_state(&peer).await;
            if !state.mutual {
                dropped.push(key);
                continue;
            }
            if !state.online {
                continue;
            }
            if let Some(mut sub) = self.inner.subscriptions.get_mut(&key) {
                if sub.evaluate(&updates, now) {
                    sub.last_push = now;
                    owed.push((
                        JobKey {
                            peer: key.clone(),
                            seqnr: sub.seqnr,
                        },
                        sub.peer.clone(),
                        sub.seqnr,
                        sub.request.clone(),
                    ));
                }
            }
        }

        for key in dropped {
            warn!("dropping subscription from {}: contact no longer mutual", key);
            self.inner.subscriptions.remove(&key);
        }
        for (key, peer, seqnr, request) in owed {
            self.cancel_job(&key);
            self.spawn_job(key, peer, seqnr, request);
        }
    }

    /// Re-checks every subscription against the provisioning layer, dropping
    /// the ones no longer authorized. Call after access rules change.
    pub async fn clear_authorization_cache(&self) {
        let keys: Vec<String> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            let (peer, request) = match self.inner.subscriptions.get(&key) {
                Some(sub) => (sub.peer.clone(), sub.request.clone()),
                None => continue,
            };
            match self.inner.provisioning.can_read(&request, &peer).await {
                Authorization::Granted(granted) => {
                    if let Some(mut sub) = self.inner.subscriptions.get_mut(&key) {
                        sub.request = granted;
                    }
                }
                Authorization::Denied(reason) => {
                    warn!("dropping subscription from {}: {}", peer, reason);
                    self.inner.subscriptions.remove(&key);
                }
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Cancels every running and scheduled job and drops all subscriptions.
    pub fn abort_all(&self) {
        for entry in self.inner.jobs.iter() {
            if let JobHandle::Running { token, .. } = entry.value() {
                token.cancel();
            }
        }
        self.inner.jobs.clear();
        self.inner.subscriptions.clear();
        self.inner.queue.shutdown();
    }

    fn cancel_job(
        &self,
        key: &JobKey,
    ) {
        if let Some((_, handle)) = self.inner.jobs.remove(key) {
            match handle {
                JobHandle::Scheduled(at) => {
                    self.inner.queue.remove(at);
                }
                JobHandle::Running { token, .. } => token.cancel(),
            }
        }
    }

    fn schedule_job(
        &self,
        key: JobKey,
        peer: PeerAddress,
        seqnr: u32,
        request: ReadoutRequest,
        at: Instant,
    ) {
        let server = self.clone();
        let fired_key = key.clone();
        let filed = self.inner.queue.schedule(
            at,
            Box::new(move || {
                server.spawn_job(fired_key, peer, seqnr, request);
            }),
        );
        self.inner.jobs.insert(key, JobHandle::Scheduled(filed));
    }

    fn spawn_job(
        &self,
        key: JobKey,
        peer: PeerAddress,
        seqnr: u32,
        request: ReadoutRequest,
    ) {
        let id = self.inner.next_job_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.inner.jobs.insert(
            key.clone(),
            JobHandle::Running {
                id,
                token: token.clone(),
            },
        );

        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run_job(&peer, seqnr, request, token).await {
                error!("readout job for {} (seqnr {}) failed: {}", peer, seqnr, e);
            }
            // only clear our own entry; the key may have been reused
            server.inner.jobs.remove_if(&key, |_, handle| {
                matches!(handle, JobHandle::Running { id: current, .. } if *current == id)
            });
        });
    }

    async fn run_job(
        &self,
        peer: &PeerAddress,
        seqnr: u32,
        request: ReadoutRequest,
        token: CancellationToken,
    ) -> Result<()> {
        let _permit = self.inner.job_permits.clone().acquire_owned().await.ok();

        self.inner
            .channel
            .send_message(peer, started_push(seqnr))
            .await?;

        let (tx, mut rx) = mpsc::channel::<String>(1);
        let source = Arc::clone(&self.inner.source);
        let threshold = self.inner.config.partition_threshold;
        let worker = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut sink = PartitionedExport::new(XmlExport::new(), threshold, move |chunk| {
                // a closed receiver means the job was cancelled
                let _ = tx.blocking_send(chunk);
            });
            sink.start();
            source.read(&request, &mut sink)?;
            sink.end();
            Ok(sink.finish())
        });

        let mut cancelled = false;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    cancelled = true;
                    break;
                }
                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        self.inner
                            .channel
                            .send_message(peer, annotate_fields(&chunk, seqnr, false))
                            .await?;
                    }
                    None => break,
                }
            }
        }
        if cancelled {
            drop(rx);
            let _ = worker.await;
            debug!("readout for {} (seqnr {}) cancelled", peer, seqnr);
            return Ok(());
        }

        match worker.await? {
            Ok(final_chunk) => {
                if chunk_has_values(&final_chunk) {
                    self.inner
                        .channel
                        .send_message(peer, annotate_fields(&final_chunk, seqnr, true))
                        .await?;
                } else {
                    self.inner.channel.send_message(peer, done_push(seqnr)).await?;
                }
            }
            Err(e) => {
                let errors = vec![ReadoutError {
                    timepoint: Some(Utc::now()),
                    text: e.to_string(),
                    ..Default::default()
                }];
                self.inner
                    .channel
                    .send_message(peer, failure_push(seqnr, true, &errors))
                    .await?;
            }
        }
        Ok(())
    }
}

fn chunk_has_values(xml: &str) -> bool {
    xml.contains("<timestamp")
}

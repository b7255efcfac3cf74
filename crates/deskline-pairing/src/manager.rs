// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairing life cycle of channel instances.
//!
//! Each in-flight attempt owns a cancellation token and a `watch` channel of
//! [`PairingView`]. A background task polls the gateway until the scan is
//! confirmed, the attempt fails, or the deadline passes. Gateway pushes feed
//! the same state machine through [`PairingManager::handle_gateway_event`].
//! Every status change is a compare-and-set in storage, so the poll task and
//! pushed events can race safely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use deskline_config::model::{PairingConfig, PlanConfig};
use deskline_core::{
    ChannelGateway, DesklineError, GatewayEndpoint, GatewayEvent, Instance, InstanceId,
    InstanceStatus, PairingPoll, ProviderKind, QueueId, StorageAdapter, TenantId,
};
use deskline_gateway::EndpointResolver;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::view::PairingView;

/// Timing and quota knobs for pairing.
#[derive(Debug, Clone)]
pub struct PairingSettings {
    /// Deadline for the scan to be confirmed.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Instance quota for tenants without a persisted limit.
    pub default_instance_limit: u32,
}

impl PairingSettings {
    pub fn from_config(pairing: &PairingConfig, plan: &PlanConfig) -> Self {
        Self {
            timeout: Duration::from_secs(pairing.timeout_secs),
            poll_interval: Duration::from_millis(pairing.poll_interval_ms),
            default_instance_limit: plan.max_instances,
        }
    }
}

/// Attributes of an instance created by [`PairingManager::initiate_pairing`].
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub display_name: String,
    pub provider: ProviderKind,
    pub default_queue_id: Option<QueueId>,
}

impl NewInstance {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            provider: ProviderKind::default(),
            default_queue_id: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Observation {
    Code(String),
    Connected(Option<String>),
    Failed(String),
    /// The deadline passed without confirmation. Unlike `Failed` it never
    /// applies to a connected instance.
    TimedOut(String),
}

impl From<GatewayEvent> for Observation {
    fn from(event: GatewayEvent) -> Self {
        match event {
            GatewayEvent::CodeIssued { code } => Observation::Code(code),
            GatewayEvent::ScanConfirmed { phone } => Observation::Connected(phone),
            GatewayEvent::Error { message } => Observation::Failed(message),
        }
    }
}

struct Attempt {
    generation: u64,
    cancel: CancellationToken,
    view: watch::Sender<PairingView>,
}

struct Inner {
    storage: Arc<dyn StorageAdapter>,
    gateway: Arc<dyn ChannelGateway>,
    endpoints: EndpointResolver,
    settings: PairingSettings,
    attempts: DashMap<InstanceId, Attempt>,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

/// Owns every in-flight pairing attempt of the process.
#[derive(Clone)]
pub struct PairingManager {
    inner: Arc<Inner>,
}

impl PairingManager {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        gateway: Arc<dyn ChannelGateway>,
        endpoints: EndpointResolver,
        settings: PairingSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                gateway,
                endpoints,
                settings,
                attempts: DashMap::new(),
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    async fn instance_limit(&self, tenant: &TenantId) -> Result<u32, DesklineError> {
        Ok(self
            .inner
            .storage
            .get_tenant_settings(tenant)
            .await?
            .and_then(|s| s.instance_limit)
            .unwrap_or(self.inner.settings.default_instance_limit))
    }

    /// Creates an instance in `generating_code` and starts pairing it.
    ///
    /// Fails with `QuotaExceeded` when the tenant already holds its limit of
    /// pairing or connected instances.
    pub async fn initiate_pairing(
        &self,
        tenant: &TenantId,
        new: NewInstance,
    ) -> Result<Instance, DesklineError> {
        if let Some(queue_id) = &new.default_queue_id {
            let queue = self.inner.storage.get_queue(queue_id).await?;
            if queue.is_none_or(|q| &q.tenant_id != tenant) {
                return Err(DesklineError::not_found("queue", queue_id));
            }
        }

        let limit = self.instance_limit(tenant).await?;
        let now = deskline_core::types::now();
        let instance = Instance {
            id: InstanceId::generate(),
            owner_id: tenant.clone(),
            display_name: new.display_name,
            status: InstanceStatus::GeneratingCode,
            phone: None,
            provider: new.provider,
            default_queue_id: new.default_queue_id,
            created_at: now,
            updated_at: now,
        };

        let (generation, cancel) = self.reserve(&instance)?;
        if let Err(e) = self.inner.storage.create_instance(&instance, limit).await {
            self.release(&instance.id, generation);
            return Err(e);
        }

        info!(
            instance_id = %instance.id,
            tenant_id = %tenant,
            name = %instance.display_name,
            "pairing initiated"
        );
        self.spawn_attempt(instance.clone(), generation, cancel);
        Ok(instance)
    }

    /// Starts a new pairing attempt for an `uninitialized` or `failed` instance.
    ///
    /// A second call while an attempt is in flight is rejected with
    /// `PairingInProgress`, never queued.
    pub async fn pair(&self, id: &InstanceId) -> Result<Instance, DesklineError> {
        let current = self
            .inner
            .storage
            .get_instance(id)
            .await?
            .ok_or_else(|| DesklineError::not_found("instance", id))?;
        if current.status.is_pairing() {
            return Err(DesklineError::PairingInProgress {
                instance: id.to_string(),
            });
        }

        let limit = self.instance_limit(&current.owner_id).await?;
        let (generation, cancel) = self.reserve(&current)?;
        match self.inner.storage.begin_pairing(id, limit).await {
            Ok(instance) => {
                info!(instance_id = %id, "pairing restarted");
                self.spawn_attempt(instance.clone(), generation, cancel);
                Ok(instance)
            }
            Err(e) => {
                self.release(id, generation);
                Err(e)
            }
        }
    }

    /// Applies an out-of-band gateway notification. Returns the resulting status.
    pub async fn handle_gateway_event(
        &self,
        id: &InstanceId,
        event: GatewayEvent,
    ) -> Result<InstanceStatus, DesklineError> {
        debug!(instance_id = %id, ?event, "gateway event received");
        self.observe(id, Observation::from(event), None).await
    }

    /// Live view of an in-flight attempt.
    pub fn watch(&self, id: &InstanceId) -> Option<watch::Receiver<PairingView>> {
        self.inner.attempts.get(id).map(|a| a.view.subscribe())
    }

    /// Current view, from the in-flight attempt if there is one.
    pub async fn view(&self, id: &InstanceId) -> Result<PairingView, DesklineError> {
        if let Some(view) = self.inner.attempts.get(id).map(|a| a.view.borrow().clone()) {
            return Ok(view);
        }
        let instance = self
            .inner
            .storage
            .get_instance(id)
            .await?
            .ok_or_else(|| DesklineError::not_found("instance", id))?;
        Ok(PairingView::of(&instance))
    }

    /// Ends the instance's session and returns it to `uninitialized`. Idempotent.
    ///
    /// An in-flight attempt is cancelled and passes through `failed`. Gateway
    /// teardown failures are logged and otherwise ignored.
    pub async fn disconnect(&self, id: &InstanceId) -> Result<(), DesklineError> {
        self.finish(id, None);
        let storage = &self.inner.storage;

        let mut last_err = None;
        let mut settled = None;
        for _ in 0..4 {
            let Some(current) = storage.get_instance(id).await? else {
                debug!(instance_id = %id, "disconnect of unknown instance");
                return Ok(());
            };
            let next = match current.status {
                InstanceStatus::Uninitialized => {
                    settled = Some(current);
                    break;
                }
                s if s.is_pairing() => InstanceStatus::Failed,
                _ => InstanceStatus::Uninitialized,
            };
            match storage
                .transition_instance(id, current.status, next, None)
                .await
            {
                Ok(_) => {}
                // Lost a race with the poll task; re-read and retry.
                Err(e @ DesklineError::InvalidTransition { .. }) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        let Some(instance) = settled else {
            return Err(last_err.unwrap_or_else(|| {
                DesklineError::Internal(format!("instance {id} did not settle"))
            }));
        };
        info!(instance_id = %id, "instance disconnected");

        match self.inner.endpoints.endpoint(&instance).await {
            Ok(endpoint) => {
                if let Err(e) = self.inner.gateway.teardown(&endpoint).await {
                    warn!(instance_id = %id, error = %e, "gateway teardown failed");
                }
            }
            Err(e) => warn!(instance_id = %id, error = %e, "could not resolve gateway endpoint"),
        }
        Ok(())
    }

    /// Disconnects and deletes the instance. Its tickets keep their history.
    pub async fn remove(&self, id: &InstanceId) -> Result<(), DesklineError> {
        self.disconnect(id).await?;
        self.inner.storage.delete_instance(id).await?;
        info!(instance_id = %id, "instance removed");
        Ok(())
    }

    /// Fails instances a previous process left mid-pairing. Returns how many.
    pub async fn recover_stale(&self) -> Result<usize, DesklineError> {
        let stale = self.inner.storage.list_pairing_instances().await?;
        let mut recovered = 0;
        for instance in stale {
            if self.inner.attempts.contains_key(&instance.id) {
                continue;
            }
            match self
                .inner
                .storage
                .transition_instance(&instance.id, instance.status, InstanceStatus::Failed, None)
                .await
            {
                Ok(_) => {
                    recovered += 1;
                    info!(instance_id = %instance.id, from = %instance.status, "stale pairing marked failed");
                }
                Err(e) => warn!(instance_id = %instance.id, error = %e, "stale pairing recovery failed"),
            }
        }
        Ok(recovered)
    }

    /// Number of attempts currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.attempts.len()
    }

    /// Cancels every in-flight attempt. Storage is left as-is for `recover_stale`.
    pub fn shutdown(&self) {
        let count = self.inner.attempts.len();
        self.inner.shutdown.cancel();
        self.inner.attempts.clear();
        info!(cancelled = count, "pairing manager shut down");
    }

    // --- internals ---

    fn reserve(&self, instance: &Instance) -> Result<(u64, CancellationToken), DesklineError> {
        match self.inner.attempts.entry(instance.id.clone()) {
            Entry::Occupied(_) => Err(DesklineError::PairingInProgress {
                instance: instance.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
                let cancel = self.inner.shutdown.child_token();
                let (view, _) = watch::channel(PairingView {
                    instance_id: instance.id.clone(),
                    status: InstanceStatus::GeneratingCode,
                    code: None,
                    phone: None,
                    error: None,
                });
                slot.insert(Attempt {
                    generation,
                    cancel: cancel.clone(),
                    view,
                });
                Ok((generation, cancel))
            }
        }
    }

    fn release(&self, id: &InstanceId, generation: u64) {
        if let Some((_, attempt)) = self
            .inner
            .attempts
            .remove_if(id, |_, a| a.generation == generation)
        {
            attempt.cancel.cancel();
        }
    }

    /// Ends the attempt of `generation`, or whichever attempt is current when
    /// `None`. A finished task never removes a newer attempt's entry.
    fn finish(&self, id: &InstanceId, generation: Option<u64>) {
        match generation {
            Some(generation) => self.release(id, generation),
            None => {
                if let Some((_, attempt)) = self.inner.attempts.remove(id) {
                    attempt.cancel.cancel();
                }
            }
        }
    }

    fn publish(
        &self,
        id: &InstanceId,
        generation: Option<u64>,
        update: impl FnOnce(&mut PairingView),
    ) {
        if let Some(attempt) = self.inner.attempts.get(id)
            && generation.is_none_or(|g| g == attempt.generation)
        {
            attempt.view.send_modify(update);
        }
    }

    fn spawn_attempt(&self, instance: Instance, generation: u64, cancel: CancellationToken) {
        let manager = self.clone();
        tokio::spawn(async move {
            let endpoint = match manager.inner.endpoints.endpoint(&instance).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    let reason = format!("could not resolve gateway endpoint: {e}");
                    let failed = Observation::Failed(reason);
                    if let Err(e) = manager.observe(&instance.id, failed, Some(generation)).await {
                        warn!(instance_id = %instance.id, error = %e, "failed to record pairing failure");
                    }
                    manager.finish(&instance.id, Some(generation));
                    return;
                }
            };
            manager
                .run_attempt(&instance.id, &endpoint, generation, &cancel)
                .await;
        });
    }

    async fn run_attempt(
        &self,
        id: &InstanceId,
        endpoint: &GatewayEndpoint,
        generation: u64,
        cancel: &CancellationToken,
    ) {
        let deadline = Instant::now() + self.inner.settings.timeout;
        loop {
            let poll = tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {
                    self.time_out(id, generation, cancel).await;
                    return;
                }
                poll = self.inner.gateway.poll_pairing(endpoint) => poll,
            };
            if cancel.is_cancelled() {
                return;
            }

            let observation = match poll {
                Ok(PairingPoll::Waiting) => None,
                Ok(PairingPoll::Code(code)) => Some(Observation::Code(code)),
                Ok(PairingPoll::Connected { phone }) => Some(Observation::Connected(phone)),
                Err(e) => {
                    warn!(instance_id = %id, error = %e, "gateway poll failed, retrying");
                    None
                }
            };
            if let Some(observation) = observation {
                match self.observe(id, observation, Some(generation)).await {
                    Ok(InstanceStatus::Connected | InstanceStatus::Failed) => return,
                    Ok(_) => {}
                    Err(e @ DesklineError::NotFound { .. }) => {
                        debug!(instance_id = %id, error = %e, "instance vanished during pairing");
                        self.finish(id, Some(generation));
                        return;
                    }
                    Err(e) => warn!(instance_id = %id, error = %e, "pairing update failed"),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {
                    self.time_out(id, generation, cancel).await;
                    return;
                }
                _ = tokio::time::sleep(self.inner.settings.poll_interval) => {}
            }
        }
    }

    /// Fails the attempt of `generation` unless it was confirmed or cancelled
    /// in the meantime.
    async fn time_out(&self, id: &InstanceId, generation: u64, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        let reason = format!(
            "pairing timed out after {}s",
            self.inner.settings.timeout.as_secs_f32()
        );
        match self
            .observe(id, Observation::TimedOut(reason), Some(generation))
            .await
        {
            Ok(status) => debug!(instance_id = %id, %status, "pairing deadline reached"),
            Err(e) => warn!(instance_id = %id, error = %e, "failed to time out pairing"),
        }
        self.finish(id, Some(generation));
    }

    /// Applies `observation` on behalf of the attempt of `generation`, or of
    /// the current attempt when `None`.
    async fn observe(
        &self,
        id: &InstanceId,
        observation: Observation,
        generation: Option<u64>,
    ) -> Result<InstanceStatus, DesklineError> {
        let mut outcome = self.observe_once(id, observation.clone(), generation).await;
        if matches!(outcome, Err(DesklineError::InvalidTransition { .. })) {
            // Another observer moved the instance first; judge against the fresh row.
            outcome = self.observe_once(id, observation, generation).await;
        }
        outcome
    }

    async fn observe_once(
        &self,
        id: &InstanceId,
        observation: Observation,
        generation: Option<u64>,
    ) -> Result<InstanceStatus, DesklineError> {
        use InstanceStatus::*;

        let storage = &self.inner.storage;
        let instance = storage
            .get_instance(id)
            .await?
            .ok_or_else(|| DesklineError::not_found("instance", id))?;

        let status = match (instance.status, observation) {
            (GeneratingCode, Observation::Code(code)) => {
                storage
                    .transition_instance(id, GeneratingCode, AwaitingScan, None)
                    .await?;
                info!(instance_id = %id, "pairing code issued");
                self.publish(id, generation, |v| {
                    v.status = AwaitingScan;
                    v.code = Some(code);
                });
                AwaitingScan
            }
            (AwaitingScan, Observation::Code(code)) => {
                self.publish(id, generation, |v| {
                    if v.code.as_deref() != Some(code.as_str()) {
                        v.code = Some(code);
                    }
                });
                return Ok(AwaitingScan);
            }
            (GeneratingCode, Observation::Connected(phone)) => {
                storage
                    .transition_instance(id, GeneratingCode, AwaitingScan, None)
                    .await?;
                self.connect(id, phone, generation).await?
            }
            (AwaitingScan, Observation::Connected(phone)) => self.connect(id, phone, generation).await?,
            (
                from @ (GeneratingCode | AwaitingScan),
                Observation::Failed(reason) | Observation::TimedOut(reason),
            )
            | (from @ Connected, Observation::Failed(reason)) => {
                storage.transition_instance(id, from, Failed, None).await?;
                warn!(instance_id = %id, %from, reason = %reason, "pairing failed");
                self.publish(id, generation, |v| {
                    v.status = Failed;
                    v.code = None;
                    v.error = Some(reason);
                });
                Failed
            }
            (status, observation) => {
                debug!(instance_id = %id, %status, ?observation, "ignoring stale pairing observation");
                return Ok(status);
            }
        };

        if matches!(status, Connected | Failed) {
            self.finish(id, generation);
        }
        Ok(status)
    }

    async fn connect(
        &self,
        id: &InstanceId,
        phone: Option<String>,
        generation: Option<u64>,
    ) -> Result<InstanceStatus, DesklineError> {
        let instance = self
            .inner
            .storage
            .transition_instance(id, InstanceStatus::AwaitingScan, InstanceStatus::Connected, phone)
            .await?;
        info!(instance_id = %id, phone = ?instance.phone, "instance connected");
        self.publish(id, generation, |v| {
            v.status = InstanceStatus::Connected;
            v.code = None;
            v.phone = instance.phone.clone();
        });
        Ok(InstanceStatus::Connected)
    }
}

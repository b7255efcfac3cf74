// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the REST API.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use deskline_core::{
    Agent, AgentId, AgentPresence, AutoReplySettings, GatewayEvent, HealthStatus, InboundMessage,
    Instance, InstanceId, InstanceStatus, Message, MessageId, MessageStatus, PluginAdapter,
    ProviderKind, Queue, QueueDisposal, QueueId, StorageAdapter, TenantId, TenantSettings, Ticket,
    TicketId, TicketView,
};
use deskline_pairing::{NewInstance, PairingView};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::ApiState;

type ApiResult<T> = Result<T, ApiError>;

const DEFAULT_PAGE: u32 = 100;

// --- Health ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    let (code, status) = match state.engine.storage.health_check().await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "healthy".to_string()),
        Ok(HealthStatus::Degraded(reason)) => (StatusCode::OK, format!("degraded: {reason}")),
        Ok(HealthStatus::Unhealthy(reason)) => {
            (StatusCode::SERVICE_UNAVAILABLE, format!("unhealthy: {reason}"))
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("unhealthy: {e}")),
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.started_at.elapsed().as_secs(),
        }),
    )
}

// --- Inbound ---

#[derive(Debug, Serialize)]
pub struct InboundResponse {
    pub ticket_id: TicketId,
    pub message_id: MessageId,
    pub ticket_created: bool,
}

/// POST /v1/inbound
///
/// Webhook the channel gateway calls for every message a contact sends.
pub async fn post_inbound(
    State(state): State<ApiState>,
    Json(inbound): Json<InboundMessage>,
) -> ApiResult<(StatusCode, Json<InboundResponse>)> {
    let outcome = state.engine.router.route_inbound(inbound).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(InboundResponse {
            ticket_id: outcome.ticket.id,
            message_id: outcome.message.id,
            ticket_created: outcome.ticket_created,
        }),
    ))
}

// --- Tickets ---

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    /// "mine", "queued" (default) or "closed".
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default)]
    pub agent: Option<AgentId>,
    #[serde(default)]
    pub queue: Option<QueueId>,
}

impl TicketListQuery {
    fn view(self) -> Result<TicketView, ApiError> {
        match self.view.as_deref().unwrap_or("queued") {
            "mine" => self
                .agent
                .map(TicketView::Mine)
                .ok_or_else(|| ApiError::BadRequest("view=mine requires agent".into())),
            "queued" => Ok(TicketView::Queued(self.queue)),
            "closed" => Ok(TicketView::Closed),
            other => Err(ApiError::BadRequest(format!("unknown ticket view: {other}"))),
        }
    }
}

/// GET /v1/tenants/{tenant}/tickets
pub async fn list_tickets(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
    Query(query): Query<TicketListQuery>,
) -> ApiResult<Json<Vec<Ticket>>> {
    let view = query.view()?;
    Ok(Json(state.engine.router.list_tickets(&tenant, &view).await?))
}

/// GET /v1/tickets/{id}
pub async fn get_ticket(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.router.get_ticket(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    pub agent_id: AgentId,
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub queue_id: QueueId,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub agent_id: Option<AgentId>,
}

/// POST /v1/tickets/{id}/claim
pub async fn claim_ticket(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(body): Json<AgentRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.router.claim(&id, &body.agent_id).await?))
}

/// POST /v1/tickets/{id}/transfer-queue
pub async fn transfer_to_queue(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(body): Json<QueueRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(
        state.engine.router.transfer_to_queue(&id, &body.queue_id).await?,
    ))
}

/// POST /v1/tickets/{id}/transfer-agent
pub async fn transfer_to_agent(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(body): Json<AgentRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(
        state.engine.router.transfer_to_agent(&id, &body.agent_id).await?,
    ))
}

/// POST /v1/tickets/{id}/resolve
pub async fn resolve_ticket(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(body): Json<ResolveRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(
        state
            .engine
            .router
            .resolve(&id, body.agent_id.as_ref())
            .await?,
    ))
}

/// POST /v1/tickets/{id}/return-to-queue
pub async fn return_to_queue(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.router.return_to_queue(&id).await?))
}

/// POST /v1/tickets/{id}/read
pub async fn acknowledge_read(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.router.acknowledge_read(&id).await?))
}

// --- Messages ---

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub body: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// POST /v1/tickets/{id}/messages
///
/// Returns 201 with the persisted message. A delivery failure still returns
/// the record, with status `failed`.
pub async fn send_message(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(body): Json<SendRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    if body.body.trim().is_empty() {
        return Err(ApiError::BadRequest("message body is empty".into()));
    }
    let message = state
        .engine
        .router
        .send_message(&id, &body.body, body.correlation_id)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Cursor: both `after_ts` and `after_id` of the last message seen.
    #[serde(default)]
    pub after_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub after_id: Option<MessageId>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /v1/tickets/{id}/messages
pub async fn list_messages(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let after = match (query.after_ts, query.after_id) {
        (Some(ts), Some(id)) => Some((ts, id)),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "after_ts and after_id must be given together".into(),
            ));
        }
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).max(1);
    Ok(Json(state.engine.router.history(&id, after, limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReceiptRequest {
    pub status: MessageStatus,
}

/// POST /v1/messages/{id}/status
///
/// Delivery and read receipts from the gateway.
pub async fn post_receipt(
    State(state): State<ApiState>,
    Path(id): Path<MessageId>,
    Json(body): Json<ReceiptRequest>,
) -> ApiResult<Json<Message>> {
    Ok(Json(
        state
            .engine
            .router
            .mark_message_status(&id, body.status)
            .await?,
    ))
}

// --- Instances ---

#[derive(Debug, Deserialize)]
pub struct NewInstanceRequest {
    pub display_name: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub default_queue_id: Option<QueueId>,
}

/// POST /v1/tenants/{tenant}/instances
pub async fn create_instance(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
    Json(body): Json<NewInstanceRequest>,
) -> ApiResult<(StatusCode, Json<Instance>)> {
    let instance = state
        .engine
        .pairing
        .initiate_pairing(
            &tenant,
            NewInstance {
                display_name: body.display_name,
                provider: body.provider,
                default_queue_id: body.default_queue_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// GET /v1/tenants/{tenant}/instances
pub async fn list_instances(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
) -> ApiResult<Json<Vec<Instance>>> {
    Ok(Json(state.engine.storage.list_instances(&tenant).await?))
}

/// GET /v1/instances/{id}
pub async fn get_instance(
    State(state): State<ApiState>,
    Path(id): Path<InstanceId>,
) -> ApiResult<Json<PairingView>> {
    Ok(Json(state.engine.pairing.view(&id).await?))
}

/// POST /v1/instances/{id}/pair
pub async fn pair_instance(
    State(state): State<ApiState>,
    Path(id): Path<InstanceId>,
) -> ApiResult<Json<Instance>> {
    Ok(Json(state.engine.pairing.pair(&id).await?))
}

/// POST /v1/instances/{id}/disconnect
pub async fn disconnect_instance(
    State(state): State<ApiState>,
    Path(id): Path<InstanceId>,
) -> ApiResult<StatusCode> {
    state.engine.pairing.disconnect(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/instances/{id}
pub async fn delete_instance(
    State(state): State<ApiState>,
    Path(id): Path<InstanceId>,
) -> ApiResult<StatusCode> {
    state.engine.pairing.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct InstanceStatusResponse {
    pub status: InstanceStatus,
}

/// POST /v1/instances/{id}/events
///
/// Pairing notifications pushed by the gateway.
pub async fn post_gateway_event(
    State(state): State<ApiState>,
    Path(id): Path<InstanceId>,
    Json(event): Json<GatewayEvent>,
) -> ApiResult<Json<InstanceStatusResponse>> {
    let status = state.engine.pairing.handle_gateway_event(&id, event).await?;
    Ok(Json(InstanceStatusResponse { status }))
}

// --- Queues and agents ---

#[derive(Debug, Deserialize)]
pub struct NewQueueRequest {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// POST /v1/tenants/{tenant}/queues
pub async fn create_queue(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
    Json(body): Json<NewQueueRequest>,
) -> ApiResult<(StatusCode, Json<Queue>)> {
    let queue = state
        .engine
        .router
        .create_queue(&tenant, &body.name, body.color)
        .await?;
    Ok((StatusCode::CREATED, Json(queue)))
}

/// GET /v1/tenants/{tenant}/queues
pub async fn list_queues(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
) -> ApiResult<Json<Vec<Queue>>> {
    Ok(Json(state.engine.router.list_queues(&tenant).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQueueQuery {
    /// Without a target the queue's tickets are orphaned.
    #[serde(default)]
    pub reassign_to: Option<QueueId>,
}

#[derive(Debug, Serialize)]
pub struct DeleteQueueResponse {
    pub tickets_touched: u64,
}

/// DELETE /v1/queues/{id}
pub async fn delete_queue(
    State(state): State<ApiState>,
    Path(id): Path<QueueId>,
    Query(query): Query<DeleteQueueQuery>,
) -> ApiResult<Json<DeleteQueueResponse>> {
    let disposal = match query.reassign_to {
        Some(target) => QueueDisposal::ReassignTo(target),
        None => QueueDisposal::Orphan,
    };
    let tickets_touched = state.engine.router.delete_queue(&id, disposal).await?;
    Ok(Json(DeleteQueueResponse { tickets_touched }))
}

#[derive(Debug, Deserialize)]
pub struct NewAgentRequest {
    pub identity_ref: String,
    pub display_name: String,
}

/// POST /v1/tenants/{tenant}/agents
pub async fn register_agent(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
    Json(body): Json<NewAgentRequest>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let agent = state
        .engine
        .router
        .register_agent(&tenant, &body.identity_ref, &body.display_name)
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /v1/tenants/{tenant}/agents
pub async fn list_agents(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.engine.router.list_agents(&tenant).await?))
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub presence: AgentPresence,
}

/// PUT /v1/agents/{id}/presence
pub async fn set_presence(
    State(state): State<ApiState>,
    Path(id): Path<AgentId>,
    Json(body): Json<PresenceRequest>,
) -> ApiResult<Json<Agent>> {
    Ok(Json(
        state
            .engine
            .router
            .set_agent_presence(&id, body.presence)
            .await?,
    ))
}

// --- Settings ---

/// GET /v1/tenants/{tenant}/auto-reply
pub async fn get_auto_reply(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
) -> ApiResult<Json<AutoReplySettings>> {
    Ok(Json(state.engine.auto_reply.settings(&tenant).await?))
}

#[derive(Debug, Deserialize)]
pub struct AutoReplyRequest {
    pub enabled: bool,
    pub temperature: f32,
    #[serde(default)]
    pub system_prompt: String,
}

/// PUT /v1/tenants/{tenant}/auto-reply
pub async fn put_auto_reply(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
    Json(body): Json<AutoReplyRequest>,
) -> ApiResult<Json<AutoReplySettings>> {
    let settings = AutoReplySettings {
        tenant_id: tenant,
        enabled: body.enabled,
        temperature: body.temperature,
        system_prompt: body.system_prompt,
    };
    Ok(Json(state.engine.auto_reply.update_settings(&settings).await?))
}

/// GET /v1/tenants/{tenant}/settings
pub async fn get_tenant_settings(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
) -> ApiResult<Json<TenantSettings>> {
    let settings = state
        .engine
        .storage
        .get_tenant_settings(&tenant)
        .await?
        .unwrap_or_else(|| TenantSettings {
            tenant_id: tenant,
            ..TenantSettings::default()
        });
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
pub struct TenantSettingsRequest {
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub default_queue_id: Option<QueueId>,
    #[serde(default)]
    pub instance_limit: Option<u32>,
    #[serde(default)]
    pub agent_limit: Option<u32>,
}

/// PUT /v1/tenants/{tenant}/settings
pub async fn put_tenant_settings(
    State(state): State<ApiState>,
    Path(tenant): Path<TenantId>,
    Json(body): Json<TenantSettingsRequest>,
) -> ApiResult<Json<TenantSettings>> {
    let settings = TenantSettings {
        tenant_id: tenant,
        gateway_url: body.gateway_url,
        default_queue_id: body.default_queue_id,
        instance_limit: body.instance_limit,
        agent_limit: body.agent_limit,
    };
    state.engine.storage.upsert_tenant_settings(&settings).await?;
    Ok(Json(settings))
}

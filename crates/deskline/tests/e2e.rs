// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the assembled Deskline engine.
//!
//! Each test wires a fresh engine over a TestHarness database with a mock
//! gateway and, where needed, a mock generator. Tests are independent and
//! order-insensitive.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskline_api::Engine;
use deskline_config::DesklineConfig;
use deskline_core::{
    DesklineError, GatewayEvent, InboundMessage, Instance, InstanceId, InstanceStatus,
    MessageDirection, PairingPoll, StorageAdapter, TextGenerator, TicketStatus,
};
use deskline_pairing::NewInstance;
use deskline_sync::SyncUpdate;
use deskline_test_utils::{MockGateway, MockGenerator, TestHarness};

struct World {
    harness: TestHarness,
    gateway: Arc<MockGateway>,
    engine: Engine,
}

fn config() -> DesklineConfig {
    let mut config = DesklineConfig::default();
    config.pairing.poll_interval_ms = 10;
    config.pairing.timeout_secs = 30;
    config.auto_reply.timeout_secs = 1;
    config
}

async fn world(gateway: MockGateway, generator: Option<MockGenerator>) -> World {
    let harness = TestHarness::new().await.unwrap();
    let gateway = Arc::new(gateway);
    let generator = generator.map(|g| Arc::new(g) as Arc<dyn TextGenerator>);
    let engine = Engine::assemble(&config(), harness.dyn_storage(), gateway.clone(), generator);
    World {
        harness,
        gateway,
        engine,
    }
}

fn inbound(world: &World, instance: &Instance, body: &str) -> InboundMessage {
    InboundMessage {
        tenant_id: world.harness.tenant.clone(),
        instance_id: instance.id.clone(),
        contact_address: "5511999999999".to_string(),
        contact_name: Some("Maria".to_string()),
        body: body.to_string(),
    }
}

async fn wait_for_status(
    storage: &Arc<dyn StorageAdapter>,
    id: &InstanceId,
    status: InstanceStatus,
) -> Instance {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(instance) = storage.get_instance(id).await.unwrap()
                && instance.status == status
            {
                return instance;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("instance never reached {status}"))
}

// ---- Scenario 1: claim race ----

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let w = world(MockGateway::new(), None).await;
    let instance = w.harness.connected_instance("Main", None).await.unwrap();
    let ana = w.harness.agent("ana").await.unwrap();
    let bruno = w.harness.agent("bruno").await.unwrap();
    let routed = w
        .engine
        .router
        .route_inbound(inbound(&w, &instance, "Oi"))
        .await
        .unwrap();
    let ticket = routed.ticket.id;

    let (a, b) = tokio::join!(
        w.engine.router.claim(&ticket, &ana.id),
        w.engine.router.claim(&ticket, &bruno.id),
    );
    let wins = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "a = {a:?}, b = {b:?}");
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(DesklineError::AlreadyClaimed { .. })));

    let stored = w.engine.router.get_ticket(&ticket).await.unwrap();
    assert_eq!(stored.status, TicketStatus::Open);
    assert!(stored.owner_id == Some(ana.id) || stored.owner_id == Some(bruno.id));
}

// ---- Scenario 2: first contact creates a queued ticket ----

#[tokio::test]
async fn first_message_opens_a_pending_ticket_in_the_instance_queue() {
    let w = world(MockGateway::new(), None).await;
    let suporte = w.harness.queue("Suporte").await.unwrap();
    let instance = w
        .harness
        .connected_instance("Main", Some(&suporte))
        .await
        .unwrap();

    let routed = w
        .engine
        .router
        .route_inbound(inbound(&w, &instance, "Oi"))
        .await
        .unwrap();
    assert!(routed.ticket_created);
    assert_eq!(routed.ticket.status, TicketStatus::Pending);
    assert_eq!(routed.ticket.queue_id, Some(suporte.id));
    assert_eq!(routed.ticket.unread_count, 1);
    assert!(routed.ticket.owner_id.is_none());

    let again = w
        .engine
        .router
        .route_inbound(inbound(&w, &instance, "Alguém aí?"))
        .await
        .unwrap();
    assert!(!again.ticket_created);
    assert_eq!(again.ticket.id, routed.ticket.id);
    assert_eq!(again.ticket.unread_count, 2);
}

// ---- Scenario 3: pairing lifecycle ----

#[tokio::test]
async fn pairing_reaches_connected_and_rejects_concurrent_attempts() {
    let w = world(
        MockGateway::with_polls(vec![Some(PairingPoll::Code("2@qr-code".into()))]),
        None,
    )
    .await;
    let storage = w.harness.dyn_storage();

    let instance = w
        .engine
        .pairing
        .initiate_pairing(
            &w.harness.tenant,
            NewInstance::named("Linha Principal"),
        )
        .await
        .unwrap();
    assert_eq!(instance.status, InstanceStatus::GeneratingCode);

    wait_for_status(&storage, &instance.id, InstanceStatus::AwaitingScan).await;
    let view = w.engine.pairing.view(&instance.id).await.unwrap();
    assert_eq!(view.code.as_deref(), Some("2@qr-code"));

    assert!(matches!(
        w.engine.pairing.pair(&instance.id).await,
        Err(DesklineError::PairingInProgress { .. })
    ));

    let status = w
        .engine
        .pairing
        .handle_gateway_event(
            &instance.id,
            GatewayEvent::ScanConfirmed {
                phone: Some("5511888888888".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(status, InstanceStatus::Connected);

    let connected = wait_for_status(&storage, &instance.id, InstanceStatus::Connected).await;
    assert_eq!(connected.phone.as_deref(), Some("5511888888888"));
    w.engine.shutdown().await.unwrap();
}

// ---- Scenario 4: auto-reply ----

#[tokio::test]
async fn enabled_auto_reply_answers_once_with_an_ai_message() {
    let w = world(
        MockGateway::new(),
        Some(MockGenerator::with_replies(vec!["Custa R$ 10.".into()])),
    )
    .await;
    w.harness
        .storage
        .upsert_auto_reply(&deskline_core::AutoReplySettings {
            tenant_id: w.harness.tenant.clone(),
            enabled: true,
            temperature: 0.7,
            system_prompt: "Você é um atendente.".into(),
        })
        .await
        .unwrap();
    let instance = w.harness.connected_instance("Main", None).await.unwrap();

    let routed = w
        .engine
        .router
        .route_inbound(inbound(&w, &instance, "Qual o preço?"))
        .await
        .unwrap();
    w.engine.router.settle().await;

    let history = w
        .engine
        .router
        .history(&routed.ticket.id, None, 50)
        .await
        .unwrap();
    let outbound: Vec<_> = history
        .iter()
        .filter(|m| m.direction == MessageDirection::Outbound)
        .collect();
    assert_eq!(outbound.len(), 1);
    assert!(outbound[0].is_ai_generated);
    assert_eq!(outbound[0].body, "Custa R$ 10.");
    assert_eq!(w.gateway.sent_count().await, 1);
}

#[tokio::test]
async fn timed_out_generation_sends_nothing_and_leaves_the_ticket() {
    let w = world(
        MockGateway::new(),
        Some(MockGenerator::new().with_delay(Duration::from_secs(3))),
    )
    .await;
    w.harness.enable_auto_reply("Você é um atendente.").await.unwrap();
    let instance = w.harness.connected_instance("Main", None).await.unwrap();

    let routed = w
        .engine
        .router
        .route_inbound(inbound(&w, &instance, "Qual o preço?"))
        .await
        .unwrap();
    w.engine.router.settle().await;

    let history = w
        .engine
        .router
        .history(&routed.ticket.id, None, 50)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(w.gateway.sent_count().await, 0);
    let ticket = w.engine.router.get_ticket(&routed.ticket.id).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Pending);
    assert!(ticket.owner_id.is_none());
    assert_eq!(ticket.unread_count, 1);
}

// ---- Scenario 5: transfers ----

#[tokio::test]
async fn transfer_requeues_open_tickets_and_rejects_closed_ones() {
    let w = world(MockGateway::new(), None).await;
    let instance = w.harness.connected_instance("Main", None).await.unwrap();
    let financeiro = w.harness.queue("Financeiro").await.unwrap();
    let ana = w.harness.agent("ana").await.unwrap();
    let routed = w
        .engine
        .router
        .route_inbound(inbound(&w, &instance, "Oi"))
        .await
        .unwrap();
    let ticket = routed.ticket.id;
    w.engine.router.claim(&ticket, &ana.id).await.unwrap();

    let moved = w
        .engine
        .router
        .transfer_to_queue(&ticket, &financeiro.id)
        .await
        .unwrap();
    assert_eq!(moved.status, TicketStatus::Pending);
    assert!(moved.owner_id.is_none());
    assert_eq!(moved.queue_id, Some(financeiro.id.clone()));

    w.engine.router.claim(&ticket, &ana.id).await.unwrap();
    w.engine.router.resolve(&ticket, Some(&ana.id)).await.unwrap();
    assert!(matches!(
        w.engine.router.transfer_to_queue(&ticket, &financeiro.id).await,
        Err(DesklineError::InvalidTransition { .. })
    ));
}

// ---- Realtime sync through the assembled engine ----

#[tokio::test]
async fn viewer_sees_inbound_and_its_own_reply_once() {
    let w = world(MockGateway::new(), None).await;
    let instance = w.harness.connected_instance("Main", None).await.unwrap();
    let ana = w.harness.agent("ana").await.unwrap();
    let routed = w
        .engine
        .router
        .route_inbound(inbound(&w, &instance, "Oi"))
        .await
        .unwrap();
    w.engine.router.claim(&routed.ticket.id, &ana.id).await.unwrap();

    let updates: Arc<Mutex<Vec<SyncUpdate>>> = Arc::default();
    let sink = updates.clone();
    let handle = w
        .engine
        .sync
        .subscribe(&routed.ticket.id, move |u| sink.lock().unwrap().push(u))
        .await
        .unwrap();

    handle.send("Olá, Maria!").await.unwrap();
    w.engine
        .router
        .route_inbound(inbound(&w, &instance, "Obrigada"))
        .await
        .unwrap();

    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let entries = handle.snapshot().await;
            if entries.len() == 3 {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeline never converged");

    let bodies: Vec<_> = settled.iter().map(|e| e.message.body.as_str()).collect();
    assert_eq!(bodies, ["Oi", "Olá, Maria!", "Obrigada"]);
    assert!(settled.iter().all(|e| !e.pending));
    assert!(!updates.lock().unwrap().is_empty());
    handle.close().await;
}

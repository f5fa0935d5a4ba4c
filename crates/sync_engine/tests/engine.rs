use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use diagram_model::{
    gesture::LinkingState, ActionType, DiagramEvent, DiagramState, Edge, EventKind,
    MetadataPatch, ModelError, Node, NodePatch, StateUpdate, Viewport,
};
use sync_engine::{
    DiagramEngine, EngineConfig, EngineError, Flow, MeasurementConfig, Middleware, Next, Outcome,
    Result, TransactionContext,
};

fn recorder(engine: &DiagramEngine) -> Arc<Mutex<Vec<DiagramEvent>>> {
    let seen: Arc<Mutex<Vec<DiagramEvent>>> = Arc::default();
    for kind in EventKind::ALL.iter().filter(|kind| !kind.is_internal()) {
        let sink = Arc::clone(&seen);
        engine.events().on(*kind, move |event| {
            sink.lock().expect("lock").push(event.clone());
            Ok(())
        });
    }
    seen
}

fn counting_ids() -> sync_engine::IdGenerator {
    let next = Arc::new(AtomicUsize::new(0));
    Arc::new(move || format!("key-{}", next.fetch_add(1, Ordering::SeqCst) + 1))
}

async fn advance_ms(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

struct Veto;

#[async_trait]
impl Middleware for Veto {
    fn name(&self) -> &str {
        "veto"
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        if ctx.has_action(ActionType::PaletteDropNode) {
            return Ok(next.cancel());
        }
        next.run(ctx, None).await
    }
}

/// Lets the rest of the chain commit and queue its events, then fails.
struct FailAfterCommit;

#[async_trait]
impl Middleware for FailAfterCommit {
    fn name(&self) -> &str {
        "fail-after-commit"
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        next.run(ctx, None).await?;
        Err(EngineError::middleware(self.name(), anyhow!("layout rejected")))
    }
}

/// Queues an event of its own before failing, the way unrelated app code
/// might while the transaction is suspended.
struct BusyThenFail {
    events: sync_engine::EventManager,
}

#[async_trait]
impl Middleware for BusyThenFail {
    fn name(&self) -> &str {
        "busy-then-fail"
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        self.events.deferred_emit(DiagramEvent::ViewportChanged {
            viewport: Viewport::default(),
            previous: Viewport::default(),
        });
        tokio::task::yield_now().await;
        next.run(ctx, None).await?;
        Err(EngineError::middleware(self.name(), anyhow!("late rejection")))
    }
}

struct Turnstile {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Middleware for Turnstile {
    fn name(&self) -> &str {
        "turnstile"
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        let label = ctx.update().touched_node_ids().join(",");
        self.log.lock().expect("log").push(format!("enter {label}"));
        tokio::task::yield_now().await;
        let outcome = next.run(ctx, None).await?;
        self.log.lock().expect("log").push(format!("leave {label}"));
        Ok(outcome)
    }
}

#[tokio::test]
async fn committed_transaction_publishes_before_listeners_run() {
    let engine = Arc::new(DiagramEngine::new(EngineConfig::default()));
    let observed: Arc<Mutex<Vec<usize>>> = Arc::default();

    let weak = Arc::downgrade(&engine);
    let sink = Arc::clone(&observed);
    engine.events().on(EventKind::PaletteItemDropped, move |_| {
        if let Some(engine) = weak.upgrade() {
            sink.lock().expect("lock").push(engine.state().nodes.len());
        }
        Ok(())
    });

    let outcome = engine
        .apply(
            ActionType::PaletteDropNode,
            StateUpdate::add_nodes(vec![Node::new("fresh")]),
        )
        .await
        .expect("apply");

    assert_eq!(outcome.flow(), Flow::Committed);
    assert_eq!(*observed.lock().expect("lock"), vec![1]);
    assert_eq!(engine.events().pending_deferred_count(), 0);
}

#[tokio::test]
async fn cancelled_transaction_leaves_no_trace() {
    let engine = DiagramEngine::builder()
        .middleware(Arc::new(Veto))
        .build()
        .expect("build");
    let seen = recorder(&engine);

    let outcome = engine
        .apply(
            ActionType::PaletteDropNode,
            StateUpdate::add_nodes(vec![Node::new("fresh")]),
        )
        .await
        .expect("apply");

    assert_eq!(outcome.flow(), Flow::Cancelled);
    assert!(engine.state().nodes.is_empty());
    assert!(seen.lock().expect("lock").is_empty());
    assert_eq!(engine.events().pending_deferred_count(), 0);
}

#[tokio::test]
async fn failing_middleware_rolls_back_queued_events() {
    let engine = DiagramEngine::builder()
        .middleware(Arc::new(FailAfterCommit))
        .build()
        .expect("build");
    let seen = recorder(&engine);
    engine.events().deferred_emit(DiagramEvent::ViewportChanged {
        viewport: Viewport::default(),
        previous: Viewport::default(),
    });

    let err = engine
        .apply(
            ActionType::PaletteDropNode,
            StateUpdate::add_nodes(vec![Node::new("fresh")]),
        )
        .await
        .expect_err("must fail");

    assert!(matches!(err, EngineError::Middleware { ref name, .. } if name == "fail-after-commit"));
    assert!(engine.state().nodes.is_empty());
    assert!(seen.lock().expect("lock").is_empty());
    // Only the event queued before the transaction survives.
    assert_eq!(engine.events().pending_deferred_count(), 1);
}

#[tokio::test]
async fn rollback_keeps_events_queued_by_other_code_mid_transaction() {
    let engine = DiagramEngine::new(EngineConfig::default());
    engine
        .register_middleware(Arc::new(BusyThenFail {
            events: engine.events().clone(),
        }))
        .expect("register");

    engine
        .apply(
            ActionType::PaletteDropNode,
            StateUpdate::add_nodes(vec![Node::new("fresh")]),
        )
        .await
        .expect_err("must fail");

    assert_eq!(engine.events().pending_deferred_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_init_never_announces_the_diagram() {
    let engine = DiagramEngine::builder()
        .middleware(Arc::new(FailAfterCommit))
        .build()
        .expect("build");
    let seen = recorder(&engine);

    engine
        .apply(ActionType::Init, StateUpdate::add_nodes(vec![Node::new("n1")]))
        .await
        .expect_err("must fail");
    assert!(!engine.measurements().has_pending_measurements());
    advance_ms(2100).await;

    engine
        .apply(ActionType::Init, StateUpdate::default())
        .await
        .expect_err("must fail");
    advance_ms(1).await;

    assert!(seen.lock().expect("lock").is_empty());
    assert!(engine.state().nodes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_transaction_leaves_no_pending_measurements() {
    let engine = DiagramEngine::builder()
        .middleware(Arc::new(FailAfterCommit))
        .build()
        .expect("build");

    engine
        .apply(
            ActionType::AddNodes,
            StateUpdate::add_nodes(vec![Node::new("ghost")]),
        )
        .await
        .expect_err("must fail");

    assert!(!engine.measurements().has_pending_measurements());
    assert!(engine.measurements().wait_for_measurements().is_resolved());
}

#[tokio::test]
async fn committed_transaction_tracks_its_diff_after_publishing() {
    let engine = DiagramEngine::new(EngineConfig::default());

    engine
        .apply(
            ActionType::AddNodes,
            StateUpdate::add_nodes(vec![Node::new("n1")]),
        )
        .await
        .expect("apply");

    assert_eq!(engine.measurements().pending_ids(), vec!["node:n1"]);
    engine.destroy();
}

#[tokio::test(start_paused = true)]
async fn init_without_entities_announces_after_the_state_is_published() {
    let engine = Arc::new(DiagramEngine::new(EngineConfig::default()));
    let observed: Arc<Mutex<Vec<f64>>> = Arc::default();
    let weak = Arc::downgrade(&engine);
    let sink = Arc::clone(&observed);
    engine.events().on(EventKind::DiagramInitialized, move |_| {
        if let Some(engine) = weak.upgrade() {
            sink.lock()
                .expect("lock")
                .push(engine.state().metadata.viewport.scale);
        }
        Ok(())
    });

    let zoomed = Viewport {
        scale: 2.5,
        ..Viewport::default()
    };
    engine
        .apply(
            ActionType::Init,
            StateUpdate::metadata(MetadataPatch {
                viewport: Some(zoomed),
                ..MetadataPatch::default()
            }),
        )
        .await
        .expect("init");
    advance_ms(1).await;

    assert_eq!(*observed.lock().expect("lock"), vec![2.5]);
}

#[tokio::test]
async fn added_nodes_get_fresh_internal_ids() {
    let engine = DiagramEngine::builder()
        .id_generator(counting_ids())
        .build()
        .expect("build");

    let mut duplicate = Node::new("b");
    duplicate.internal_id = Some("key-from-clipboard".into());
    engine
        .apply(
            ActionType::AddNodes,
            StateUpdate::add_nodes(vec![Node::new("a"), duplicate]),
        )
        .await
        .expect("apply");

    let keys: Vec<_> = engine
        .state()
        .nodes
        .iter()
        .filter_map(|node| node.internal_id.clone())
        .collect();
    assert_eq!(keys, vec!["key-1", "key-2"]);
}

#[tokio::test]
async fn actions_can_be_named_by_wire_name() {
    let engine = DiagramEngine::new(EngineConfig::default());

    let err = engine
        .apply_named("teleportNodes", StateUpdate::default())
        .await
        .expect_err("unknown action");
    assert!(matches!(
        err,
        EngineError::Model(ModelError::UnknownAction(ref name)) if name == "teleportNodes"
    ));

    let outcome = engine
        .apply_named("addNodes", StateUpdate::add_nodes(vec![Node::new("a")]))
        .await
        .expect("known action");
    assert!(outcome.is_committed());
    assert_eq!(engine.state().nodes.len(), 1);
}

#[test]
fn chain_order_puts_business_middleware_in_the_middle() {
    let engine = DiagramEngine::builder()
        .config(EngineConfig {
            debug_mode: true,
            ..EngineConfig::default()
        })
        .middleware(Arc::new(Veto))
        .build()
        .expect("build");

    assert_eq!(
        engine.middleware_names(),
        vec![
            "logger",
            "internal-id",
            "veto",
            "measurement-tracking",
            "event-emitter"
        ]
    );

    let duplicate = engine.register_middleware(Arc::new(Veto));
    assert!(matches!(duplicate, Err(EngineError::DuplicateMiddleware(_))));
    engine.unregister_middleware("veto").expect("unregister");
    assert!(!engine.middleware_names().iter().any(|name| name == "veto"));
}

#[tokio::test]
async fn concurrent_transactions_run_one_at_a_time() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let engine = DiagramEngine::builder()
        .middleware(Arc::new(Turnstile {
            log: Arc::clone(&log),
        }))
        .build()
        .expect("build");

    let first = engine.apply(ActionType::AddNodes, StateUpdate::add_nodes(vec![Node::new("a")]));
    let second = engine.apply(ActionType::AddNodes, StateUpdate::add_nodes(vec![Node::new("b")]));
    let (first, second) = tokio::join!(first, second);
    first.expect("first");
    second.expect("second");

    assert_eq!(
        *log.lock().expect("log"),
        vec!["enter a", "leave a", "enter b", "leave b"]
    );
    assert_eq!(engine.state().nodes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn diagram_initialized_waits_for_measurements_to_settle() {
    let engine = DiagramEngine::new(EngineConfig::default());
    let seen = recorder(&engine);

    let mut update = StateUpdate::add_nodes(vec![Node::new("n1"), Node::new("n2")]);
    update.merge(StateUpdate::add_edges(vec![Edge::new("e1", "n1", "n2")]));
    engine.apply(ActionType::Init, update).await.expect("init");
    advance_ms(1).await;
    assert!(seen.lock().expect("lock").is_empty());

    engine.measurements().signal_node_measurement("n1");
    engine.measurements().signal_node_measurement("n2");
    engine.measurements().signal_edge_measurement("e1");
    advance_ms(49).await;
    assert!(seen.lock().expect("lock").is_empty());

    advance_ms(1).await;
    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    let DiagramEvent::DiagramInitialized { nodes, edges, .. } = &seen[0] else {
        panic!("unexpected event {:?}", seen[0]);
    };
    assert_eq!(nodes.len(), 2);
    assert_eq!(edges.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn diagram_initialized_still_fires_when_the_view_never_reports() {
    let engine = DiagramEngine::new(EngineConfig {
        measurement: MeasurementConfig {
            debounce_ms: 50,
            initial_timeout_ms: 300,
        },
        ..EngineConfig::default()
    });
    let seen = recorder(&engine);

    engine
        .apply(ActionType::Init, StateUpdate::add_nodes(vec![Node::new("n1")]))
        .await
        .expect("init");
    advance_ms(299).await;
    assert!(seen.lock().expect("lock").is_empty());

    advance_ms(1).await;
    assert_eq!(seen.lock().expect("lock").len(), 1);
    assert!(!engine.measurements().has_pending_measurements());
}

#[tokio::test]
async fn gesture_state_is_scoped_to_the_engine() {
    let first = DiagramEngine::new(EngineConfig::default());
    let second = DiagramEngine::new(EngineConfig::default());
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    first.events().on(EventKind::ActionStateChanged, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    first.actions().set_linking(Some(LinkingState {
        source_node_id: "a".into(),
        source_port_id: None,
        temporary_edge: None,
    }));

    assert!(first.is_linking());
    assert!(!second.is_linking());
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn destroy_quiets_the_engine() {
    let engine = DiagramEngine::new(EngineConfig::default());
    let seen = recorder(&engine);
    engine
        .apply(ActionType::AddNodes, StateUpdate::add_nodes(vec![Node::new("a")]))
        .await
        .expect("apply");
    let handle = engine.measurements().wait_for_measurements();
    assert!(!handle.is_resolved());

    engine.destroy();
    engine.destroy();

    assert!(engine.is_destroyed());
    assert!(handle.is_resolved());
    assert!(!engine.events().has_listeners(EventKind::SelectionChanged));
    let err = engine
        .apply(
            ActionType::ChangeSelection,
            StateUpdate::update_nodes(vec![NodePatch {
                selected: Some(true),
                ..NodePatch::new("a")
            }]),
        )
        .await
        .expect_err("destroyed");
    assert!(matches!(err, EngineError::Destroyed));
    assert!(seen.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn initial_state_is_the_first_before_state() {
    let engine = DiagramEngine::builder()
        .initial_state(DiagramState {
            nodes: vec![Node::new("a")],
            ..DiagramState::default()
        })
        .build()
        .expect("build");
    let seen = recorder(&engine);

    engine
        .apply(
            ActionType::ChangeSelection,
            StateUpdate::update_nodes(vec![NodePatch {
                selected: Some(true),
                ..NodePatch::new("a")
            }]),
        )
        .await
        .expect("apply");

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind(), EventKind::SelectionChanged);
}

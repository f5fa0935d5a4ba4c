use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use diagram_model::{ActionType, DiagramEvent, DiagramState, StateUpdate};
use tracing::{debug, info, warn};

use crate::{
    action_state::ActionStateManager,
    batch::{LabelBatchProcessor, PortBatchProcessor},
    config::EngineConfig,
    context::TransactionContext,
    emitters::{builtin_emitters, EventEmitter},
    error::{EngineError, Result},
    event_manager::EventManager,
    measurement::MeasurementTracker,
    middlewares::{
        uuid_generator, EventEmitterMiddleware, IdGenerator, InternalIdMiddleware,
        LoggerMiddleware, MeasurementTrackingMiddleware, MEASUREMENT_TRACKING,
    },
    pipeline::{Middleware, MiddlewareChain, Outcome},
};

/// One editable diagram: committed state, its event bus, gesture state,
/// measurement barrier and batch buffers, plus the middleware chain every
/// state change runs through.
///
/// Transactions are serialized; a second call waits until the first has
/// published or rolled back.
pub struct DiagramEngine {
    config: Arc<EngineConfig>,
    state: Mutex<Arc<DiagramState>>,
    chain: Mutex<MiddlewareChain>,
    turn: tokio::sync::Mutex<()>,
    events: EventManager,
    actions: ActionStateManager,
    measurements: MeasurementTracker,
    port_batches: PortBatchProcessor,
    label_batches: LabelBatchProcessor,
    destroyed: AtomicBool,
}

impl DiagramEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::assemble(config, uuid_generator(), Vec::new(), DiagramState::default())
    }

    pub fn builder() -> DiagramEngineBuilder {
        DiagramEngineBuilder::default()
    }

    fn assemble(
        config: EngineConfig,
        id_generator: IdGenerator,
        extra_emitters: Vec<Arc<dyn EventEmitter>>,
        initial_state: DiagramState,
    ) -> Self {
        let events = EventManager::new();
        let actions = ActionStateManager::new(events.clone());
        let measurements = MeasurementTracker::new(config.measurement.clone());

        let mut emitters = builtin_emitters();
        emitters.extend(extra_emitters);

        let mut chain = MiddlewareChain::new();
        if config.debug_mode {
            chain.push(Arc::new(LoggerMiddleware));
        }
        chain.push(Arc::new(InternalIdMiddleware::new(id_generator)));
        chain.push(Arc::new(MeasurementTrackingMiddleware));
        chain.push(Arc::new(EventEmitterMiddleware::new(events.clone(), emitters)));

        Self {
            config: Arc::new(config),
            state: Mutex::new(Arc::new(initial_state)),
            chain: Mutex::new(chain),
            turn: tokio::sync::Mutex::new(()),
            events,
            actions,
            measurements,
            port_batches: PortBatchProcessor::new(),
            label_batches: LabelBatchProcessor::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    pub async fn apply(&self, action: ActionType, update: StateUpdate) -> Result<Outcome> {
        self.transaction(vec![action], update).await
    }

    /// Like [`apply`](Self::apply) with the action given by its wire name.
    /// An unknown name fails before anything runs.
    pub async fn apply_named(&self, action: &str, update: StateUpdate) -> Result<Outcome> {
        let action: ActionType = action.parse()?;
        self.apply(action, update).await
    }

    /// Runs `update` through the middleware chain. The committed state is
    /// published, its diff handed to the measurement tracker and queued
    /// events flushed only when every middleware continued. A cancel or an
    /// error leaves state, tracker and listeners untouched.
    pub async fn transaction(
        &self,
        actions: Vec<ActionType>,
        update: StateUpdate,
    ) -> Result<Outcome> {
        let _turn = self.turn.lock().await;
        if self.is_destroyed() {
            return Err(EngineError::Destroyed);
        }

        let chain = self.chain().clone();
        let mut ctx = TransactionContext::new(
            actions,
            update,
            self.state(),
            self.actions.clone(),
            self.measurements.clone(),
            Arc::clone(&self.config),
        );

        match chain.run(&mut ctx).await {
            Ok(outcome) if outcome.is_committed() => {
                *self.state_slot() = ctx.committed_state();
                if let Some(update) = ctx.take_measured_update() {
                    self.measurements.track_state_update(&update, None, None);
                }
                self.events.flush_deferred_emits();
                self.emit_when_settled(ctx.take_settle_events());
                Ok(outcome)
            }
            Ok(outcome) => {
                self.events.rollback_deferred(ctx.id());
                debug!(actions = ?ctx.actions(), "[DiagramEngine] transaction cancelled");
                Ok(outcome)
            }
            Err(err) => {
                self.events.rollback_deferred(ctx.id());
                warn!(actions = ?ctx.actions(), %err, "[DiagramEngine] transaction failed");
                Err(err)
            }
        }
    }

    /// Adds business middleware between id assignment and measurement tracking.
    pub fn register_middleware(&self, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.chain()
            .register_before(MEASUREMENT_TRACKING, middleware)
    }

    pub fn register_middleware_before(
        &self,
        anchor: &str,
        middleware: Arc<dyn Middleware>,
    ) -> Result<()> {
        self.chain().register_before(anchor, middleware)
    }

    pub fn register_middleware_after(
        &self,
        anchor: &str,
        middleware: Arc<dyn Middleware>,
    ) -> Result<()> {
        self.chain().register_after(anchor, middleware)
    }

    pub fn unregister_middleware(&self, name: &str) -> Result<()> {
        self.chain().unregister(name).map(drop)
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.chain()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// The last committed state.
    pub fn state(&self) -> Arc<DiagramState> {
        Arc::clone(&self.state_slot())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn actions(&self) -> &ActionStateManager {
        &self.actions
    }

    pub fn measurements(&self) -> &MeasurementTracker {
        &self.measurements
    }

    pub fn port_batches(&self) -> &PortBatchProcessor {
        &self.port_batches
    }

    pub fn label_batches(&self) -> &LabelBatchProcessor {
        &self.label_batches
    }

    pub fn is_linking(&self) -> bool {
        self.actions.is_linking()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Tears the diagram down: pending measurements resolve, batches and
    /// queued events are dropped, listeners are removed and the bus goes
    /// quiet. Later transactions fail with [`EngineError::Destroyed`].
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.measurements.clear();
        self.port_batches.clear();
        self.label_batches.clear();
        self.events.clear_deferred_emits();
        self.events.clear_listeners();
        self.events.set_enabled(false);
        info!("[DiagramEngine] destroyed");
    }

    /// Delivers `pending` once the measurements known to the tracker settle.
    fn emit_when_settled(&self, pending: Vec<DiagramEvent>) {
        if pending.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("[DiagramEngine] no async runtime; emitting without waiting for measurements");
            for event in pending {
                self.events.emit(event);
            }
            return;
        };
        let settled = self.measurements.wait_for_measurements();
        let events = self.events.clone();
        runtime.spawn(async move {
            settled.await;
            for event in pending {
                events.emit(event);
            }
        });
    }

    fn state_slot(&self) -> MutexGuard<'_, Arc<DiagramState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn chain(&self) -> MutexGuard<'_, MiddlewareChain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub struct DiagramEngineBuilder {
    config: EngineConfig,
    id_generator: Option<IdGenerator>,
    middleware: Vec<Arc<dyn Middleware>>,
    emitters: Vec<Arc<dyn EventEmitter>>,
    initial_state: DiagramState,
}

impl DiagramEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id_generator(mut self, generator: IdGenerator) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Business middleware, run in the order added.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Extra emitter units, dispatched after the built-in ones.
    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitters.push(emitter);
        self
    }

    pub fn initial_state(mut self, state: DiagramState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn build(self) -> Result<DiagramEngine> {
        let engine = DiagramEngine::assemble(
            self.config,
            self.id_generator.unwrap_or_else(uuid_generator),
            self.emitters,
            self.initial_state,
        );
        for middleware in self.middleware {
            engine.register_middleware(middleware)?;
        }
        Ok(engine)
    }
}

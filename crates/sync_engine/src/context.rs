//! Per-transaction view of the diagram handed to every middleware.
//!
//! A context is built for one pipeline run and dropped afterwards. Until the
//! innermost step commits, the after-state equals the before-state and every
//! diff helper reports nothing.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use diagram_model::{ActionType, DiagramEvent, DiagramState, Edge, Node, StateUpdate, Viewport};

use crate::{
    action_state::ActionStateManager, config::EngineConfig, measurement::MeasurementTracker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineEnvironment {
    pub debug_mode: bool,
}

/// A diff that a middleware replaced while passing control onward.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub middleware: String,
    pub update: StateUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeProperty {
    Position,
    Size,
    Angle,
    Selected,
    GroupId,
    Ports,
    Data,
}

impl NodeProperty {
    fn differs(self, before: &Node, after: &Node) -> bool {
        match self {
            NodeProperty::Position => before.position != after.position,
            NodeProperty::Size => before.size != after.size,
            NodeProperty::Angle => before.angle != after.angle,
            NodeProperty::Selected => before.selected != after.selected,
            NodeProperty::GroupId => before.group_id != after.group_id,
            NodeProperty::Ports => before.ports != after.ports,
            NodeProperty::Data => before.data != after.data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeProperty {
    Source,
    Target,
    Selected,
    Labels,
    Data,
}

impl EdgeProperty {
    fn differs(self, before: &Edge, after: &Edge) -> bool {
        match self {
            EdgeProperty::Source => {
                before.source != after.source || before.source_port != after.source_port
            }
            EdgeProperty::Target => {
                before.target != after.target || before.target_port != after.target_port
            }
            EdgeProperty::Selected => before.selected != after.selected,
            EdgeProperty::Labels => before.labels != after.labels,
            EdgeProperty::Data => before.data != after.data,
        }
    }
}

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

pub struct TransactionContext {
    id: u64,
    actions: Vec<ActionType>,
    initial_update: StateUpdate,
    update: StateUpdate,
    history: Vec<HistoryEntry>,
    before: Arc<DiagramState>,
    before_nodes: HashMap<String, Node>,
    before_edges: HashMap<String, Edge>,
    after: Arc<DiagramState>,
    after_nodes: HashMap<String, Node>,
    after_edges: HashMap<String, Edge>,
    committed: bool,
    action_state: ActionStateManager,
    measurements: MeasurementTracker,
    config: Arc<EngineConfig>,
    environment: EngineEnvironment,
    measured: Option<StateUpdate>,
    after_settle: Mutex<Vec<DiagramEvent>>,
}

impl TransactionContext {
    pub fn new(
        actions: Vec<ActionType>,
        update: StateUpdate,
        before: Arc<DiagramState>,
        action_state: ActionStateManager,
        measurements: MeasurementTracker,
        config: Arc<EngineConfig>,
    ) -> Self {
        let before_nodes = before.node_map();
        let before_edges = before.edge_map();
        let environment = EngineEnvironment {
            debug_mode: config.debug_mode,
        };
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            actions,
            initial_update: update.clone(),
            update,
            history: Vec::new(),
            after: Arc::clone(&before),
            after_nodes: before_nodes.clone(),
            after_edges: before_edges.clone(),
            before,
            before_nodes,
            before_edges,
            committed: false,
            action_state,
            measurements,
            config,
            environment,
            measured: None,
            after_settle: Mutex::new(Vec::new()),
        }
    }

    /// Process-unique id; deferred events queued by this transaction carry it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn actions(&self) -> &[ActionType] {
        &self.actions
    }

    pub fn has_action(&self, action: ActionType) -> bool {
        self.actions.contains(&action)
    }

    /// The diff the transaction was requested with.
    pub fn initial_update(&self) -> &StateUpdate {
        &self.initial_update
    }

    /// The diff that will be committed unless a later middleware replaces it.
    pub fn update(&self) -> &StateUpdate {
        &self.update
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn before(&self) -> &DiagramState {
        &self.before
    }

    pub fn after(&self) -> &DiagramState {
        &self.after
    }

    pub fn before_nodes(&self) -> &HashMap<String, Node> {
        &self.before_nodes
    }

    pub fn before_edges(&self) -> &HashMap<String, Edge> {
        &self.before_edges
    }

    pub fn after_nodes(&self) -> &HashMap<String, Node> {
        &self.after_nodes
    }

    pub fn after_edges(&self) -> &HashMap<String, Edge> {
        &self.after_edges
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn action_state(&self) -> &ActionStateManager {
        &self.action_state
    }

    pub fn measurements(&self) -> &MeasurementTracker {
        &self.measurements
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> EngineEnvironment {
        self.environment
    }

    pub fn were_nodes_added(&self) -> bool {
        self.after
            .nodes
            .iter()
            .any(|node| !self.before_nodes.contains_key(&node.id))
    }

    pub fn added_node_ids(&self) -> Vec<String> {
        self.after
            .nodes
            .iter()
            .filter(|node| !self.before_nodes.contains_key(&node.id))
            .map(|node| node.id.clone())
            .collect()
    }

    pub fn removed_node_ids(&self) -> Vec<String> {
        self.before
            .nodes
            .iter()
            .filter(|node| !self.after_nodes.contains_key(&node.id))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Ids of nodes present on both sides whose `property` differs, in after-state order.
    pub fn changed_node_ids(&self, property: NodeProperty) -> Vec<String> {
        self.after
            .nodes
            .iter()
            .filter(|after| {
                self.before_nodes
                    .get(&after.id)
                    .is_some_and(|before| property.differs(before, after))
            })
            .map(|node| node.id.clone())
            .collect()
    }

    pub fn were_edges_added(&self) -> bool {
        self.after
            .edges
            .iter()
            .any(|edge| !self.before_edges.contains_key(&edge.id))
    }

    pub fn added_edge_ids(&self) -> Vec<String> {
        self.after
            .edges
            .iter()
            .filter(|edge| !self.before_edges.contains_key(&edge.id))
            .map(|edge| edge.id.clone())
            .collect()
    }

    pub fn removed_edge_ids(&self) -> Vec<String> {
        self.before
            .edges
            .iter()
            .filter(|edge| !self.after_edges.contains_key(&edge.id))
            .map(|edge| edge.id.clone())
            .collect()
    }

    pub fn changed_edge_ids(&self, property: EdgeProperty) -> Vec<String> {
        self.after
            .edges
            .iter()
            .filter(|after| {
                self.before_edges
                    .get(&after.id)
                    .is_some_and(|before| property.differs(before, after))
            })
            .map(|edge| edge.id.clone())
            .collect()
    }

    pub fn viewport_changed(&self) -> bool {
        self.before.metadata.viewport != self.after.metadata.viewport
    }

    pub fn viewport(&self) -> Viewport {
        self.after.metadata.viewport
    }

    pub(crate) fn replace_update(&mut self, middleware: &str, update: StateUpdate) {
        let superseded = std::mem::replace(&mut self.update, update);
        self.history.push(HistoryEntry {
            middleware: middleware.to_string(),
            update: superseded,
        });
    }

    pub(crate) fn commit(&mut self) {
        let after = self.before.apply(&self.update);
        self.after_nodes = after.node_map();
        self.after_edges = after.edge_map();
        self.after = Arc::new(after);
        self.committed = true;
    }

    pub(crate) fn committed_state(&self) -> Arc<DiagramState> {
        Arc::clone(&self.after)
    }

    /// Queues `event` for delivery once the engine has published this
    /// transaction and the measurements it started have settled. Dropped if
    /// the transaction never publishes.
    pub fn emit_when_measured(&self, event: DiagramEvent) {
        self.after_settle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub(crate) fn take_settle_events(&mut self) -> Vec<DiagramEvent> {
        std::mem::take(
            self.after_settle
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Marks the pending diff for measurement tracking after publication.
    pub(crate) fn track_measurements_on_publish(&mut self) {
        self.measured = Some(self.update.clone());
    }

    pub(crate) fn take_measured_update(&mut self) -> Option<StateUpdate> {
        self.measured.take()
    }
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;

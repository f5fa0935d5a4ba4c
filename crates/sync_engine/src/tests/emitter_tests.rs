use super::*;

use diagram_model::{
    gesture::ResizeState, ActionType, DiagramEvent, DiagramState, EventKind, GroupChange,
    MetadataPatch, NodePatch, Point, Size, StateUpdate, Viewport,
};

use crate::{
    action_state::ActionStateManager, config::EngineConfig, measurement::MeasurementTracker,
    test_support::Recorder,
};

struct Harness {
    before: DiagramState,
    actions: ActionStateManager,
}

impl Harness {
    fn new(before: DiagramState) -> Self {
        Self {
            before,
            actions: ActionStateManager::new(EventManager::new()),
        }
    }

    fn run(&self, action: ActionType, update: StateUpdate) -> Vec<DiagramEvent> {
        let events = EventManager::new();
        let recorder = Recorder::default();
        recorder.attach(&events, EventKind::ALL);

        let mut ctx = TransactionContext::new(
            vec![action],
            update,
            Arc::new(self.before.clone()),
            self.actions.clone(),
            MeasurementTracker::default(),
            Arc::new(EngineConfig::default()),
        );
        ctx.commit();
        for emitter in builtin_emitters() {
            emitter.emit(&ctx, &events).expect("built-in emitters never fail");
        }
        events.flush_deferred_emits();
        recorder.events()
    }
}

fn kinds(events: &[DiagramEvent]) -> Vec<EventKind> {
    events.iter().map(DiagramEvent::kind).collect()
}

fn two_nodes() -> DiagramState {
    DiagramState {
        nodes: vec![
            Node::new("a").at(0.0, 0.0).with_size(100.0, 50.0),
            Node::new("b").at(200.0, 0.0).with_size(100.0, 50.0),
        ],
        edges: vec![Edge::new("ab", "a", "b")],
        ..DiagramState::default()
    }
}

fn selected(mut state: DiagramState, ids: &[&str]) -> DiagramState {
    for node in &mut state.nodes {
        node.selected = ids.contains(&node.id.as_str());
    }
    state
}

#[test]
fn every_catalogue_unit_is_registered_once() {
    let names: Vec<String> = builtin_emitters()
        .iter()
        .map(|emitter| emitter.name().to_string())
        .collect();
    let unique: std::collections::HashSet<_> = names.iter().collect();

    assert_eq!(names.len(), 20);
    assert_eq!(unique.len(), names.len());
}

#[test]
fn selecting_a_node_reports_new_and_previous_selection() {
    let harness = Harness::new(selected(two_nodes(), &["b"]));
    let events = harness.run(
        ActionType::ChangeSelection,
        StateUpdate::update_nodes(vec![
            NodePatch {
                selected: Some(true),
                ..NodePatch::new("a")
            },
            NodePatch {
                selected: Some(false),
                ..NodePatch::new("b")
            },
        ]),
    );

    assert_eq!(kinds(&events), vec![EventKind::SelectionChanged]);
    let DiagramEvent::SelectionChanged {
        selected_nodes,
        previous_node_ids,
        ..
    } = &events[0]
    else {
        unreachable!()
    };
    assert_eq!(selected_nodes.len(), 1);
    assert_eq!(selected_nodes[0].id, "a");
    assert_eq!(previous_node_ids, &vec!["b".to_string()]);
}

#[test]
fn deleting_the_selection_reports_removed_entities() {
    let harness = Harness::new(selected(two_nodes(), &["a"]));
    let mut update = StateUpdate::remove_nodes(vec!["a".into()]);
    update.merge(StateUpdate::remove_edges(vec!["ab".into()]));

    let events = harness.run(ActionType::DeleteSelection, update);

    assert_eq!(
        kinds(&events),
        vec![EventKind::SelectionChanged, EventKind::SelectionRemoved]
    );
    let DiagramEvent::SelectionRemoved {
        deleted_nodes,
        deleted_edges,
    } = &events[1]
    else {
        unreachable!()
    };
    assert_eq!(deleted_nodes[0].id, "a");
    assert_eq!(deleted_edges[0].id, "ab");
}

#[test]
fn removal_under_another_action_is_not_a_selection_removal() {
    let harness = Harness::new(two_nodes());
    let events = harness.run(
        ActionType::DeleteElements,
        StateUpdate::remove_nodes(vec!["a".into()]),
    );

    assert!(events.is_empty());
}

#[test]
fn moving_nodes_reports_new_positions() {
    let harness = Harness::new(two_nodes());
    let events = harness.run(
        ActionType::MoveNodesBy,
        StateUpdate::update_nodes(vec![NodePatch {
            position: Some(Point::new(10.0, 10.0)),
            ..NodePatch::new("a")
        }]),
    );

    assert_eq!(kinds(&events), vec![EventKind::SelectionMoved]);
    let DiagramEvent::SelectionMoved { nodes } = &events[0] else {
        unreachable!()
    };
    assert_eq!(nodes[0].position, Point::new(10.0, 10.0));
}

#[test]
fn moving_without_change_is_silent() {
    let harness = Harness::new(two_nodes());
    let events = harness.run(
        ActionType::MoveNodesBy,
        StateUpdate::update_nodes(vec![NodePatch {
            position: Some(Point::new(0.0, 0.0)),
            ..NodePatch::new("a")
        }]),
    );

    assert!(events.is_empty());
}

#[test]
fn rotation_reports_angle_and_previous_angle() {
    let harness = Harness::new(two_nodes());
    let events = harness.run(
        ActionType::RotateNodeTo,
        StateUpdate::update_nodes(vec![NodePatch {
            angle: Some(45.0),
            ..NodePatch::new("b")
        }]),
    );

    assert_eq!(
        events,
        vec![DiagramEvent::SelectionRotated {
            node: Node {
                angle: 45.0,
                ..two_nodes().nodes[1].clone()
            },
            angle: 45.0,
            previous_angle: 0.0,
        }]
    );
}

#[test]
fn grouping_selected_nodes_reports_group_events() {
    let harness = Harness::new(selected(two_nodes(), &["a", "b"]));
    let group = Node {
        is_group: true,
        ..Node::new("g")
    };
    let mut update = StateUpdate::add_nodes(vec![group]);
    update.merge(StateUpdate::update_nodes(
        ["a", "b"]
            .into_iter()
            .map(|id| NodePatch {
                group_id: Some(Some("g".into())),
                ..NodePatch::new(id)
            })
            .collect(),
    ));

    let events = harness.run(ActionType::Group, update);

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::SelectionGroupChanged,
            EventKind::SelectionGrouped,
            EventKind::GroupMembershipChanged,
        ]
    );
    let DiagramEvent::SelectionGrouped { group_id, nodes } = &events[1] else {
        unreachable!()
    };
    assert_eq!(group_id, "g");
    assert_eq!(nodes.len(), 2);
    let DiagramEvent::GroupMembershipChanged { grouped, ungrouped } = &events[2] else {
        unreachable!()
    };
    assert_eq!(grouped.len(), 2);
    assert!(ungrouped.is_empty());
}

#[test]
fn ungrouping_an_unselected_node_reports_membership_only() {
    let mut before = two_nodes();
    before.nodes[0].group_id = Some("g".into());
    let harness = Harness::new(before);

    let events = harness.run(
        ActionType::UpdateNode,
        StateUpdate::update_nodes(vec![NodePatch {
            group_id: Some(None),
            ..NodePatch::new("a")
        }]),
    );

    assert_eq!(
        events,
        vec![DiagramEvent::GroupMembershipChanged {
            grouped: vec![],
            ungrouped: vec![GroupChange {
                node_id: "a".into(),
                group_id: None,
                previous_group_id: Some("g".into()),
            }],
        }]
    );
}

#[test]
fn viewport_move_reports_previous_viewport() {
    let harness = Harness::new(two_nodes());
    let viewport = Viewport {
        x: -40.0,
        y: 12.0,
        scale: 1.5,
    };
    let events = harness.run(
        ActionType::MoveViewport,
        StateUpdate::metadata(MetadataPatch {
            viewport: Some(viewport),
            data: None,
        }),
    );

    assert_eq!(
        events,
        vec![DiagramEvent::ViewportChanged {
            viewport,
            previous: Viewport::default(),
        }]
    );
}

#[test]
fn finishing_a_link_reports_the_drawn_edge() {
    let harness = Harness::new(two_nodes());
    let edge = Edge::new("ba", "b", "a");
    let events = harness.run(
        ActionType::FinishLinking,
        StateUpdate::add_edges(vec![edge.clone()]),
    );

    assert_eq!(events, vec![DiagramEvent::EdgeDrawn { edge }]);
}

#[test]
fn paste_reports_added_nodes_and_edges() {
    let harness = Harness::new(two_nodes());
    let mut update = StateUpdate::add_nodes(vec![Node::new("a2"), Node::new("b2")]);
    update.merge(StateUpdate::add_edges(vec![Edge::new("a2b2", "a2", "b2")]));

    let events = harness.run(ActionType::Paste, update);

    assert_eq!(kinds(&events), vec![EventKind::ClipboardPasted]);
    let DiagramEvent::ClipboardPasted { nodes, edges } = &events[0] else {
        unreachable!()
    };
    assert_eq!(nodes.len(), 2);
    assert_eq!(edges.len(), 1);
}

#[test]
fn resize_reports_previous_size() {
    let harness = Harness::new(two_nodes());
    let events = harness.run(
        ActionType::ResizeNode,
        StateUpdate::update_nodes(vec![NodePatch {
            size: Some(Size::new(150.0, 80.0)),
            ..NodePatch::new("a")
        }]),
    );

    assert_eq!(kinds(&events), vec![EventKind::NodeResized]);
    let DiagramEvent::NodeResized {
        node,
        previous_size,
    } = &events[0]
    else {
        unreachable!()
    };
    assert_eq!(node.size, Some(Size::new(150.0, 80.0)));
    assert_eq!(*previous_size, Some(Size::new(100.0, 50.0)));
}

#[test]
fn drag_boundaries_carry_the_selection() {
    let harness = Harness::new(selected(two_nodes(), &["b"]));

    let started = harness.run(ActionType::MoveNodesStart, StateUpdate::default());
    let ended = harness.run(ActionType::MoveNodesStop, StateUpdate::default());

    assert_eq!(kinds(&started), vec![EventKind::NodeDragStarted]);
    assert_eq!(kinds(&ended), vec![EventKind::NodeDragEnded]);

    let idle = Harness::new(two_nodes()).run(ActionType::MoveNodesStart, StateUpdate::default());
    assert!(idle.is_empty());
}

#[test]
fn resize_start_uses_the_tracked_gesture_node() {
    let harness = Harness::new(two_nodes());
    harness.actions.set_resize(Some(ResizeState {
        node_id: "b".into(),
        start_position: Point::new(200.0, 0.0),
        start_size: Size::new(100.0, 50.0),
    }));

    let events = harness.run(ActionType::ResizeStart, StateUpdate::default());

    assert_eq!(
        events,
        vec![DiagramEvent::NodeResizeStarted {
            node: two_nodes().nodes[1].clone(),
        }]
    );
}

#[test]
fn rotate_end_falls_back_to_the_patched_node() {
    let harness = Harness::new(two_nodes());
    let events = harness.run(
        ActionType::RotateEnd,
        StateUpdate::update_nodes(vec![NodePatch::new("a")]),
    );

    assert_eq!(kinds(&events), vec![EventKind::NodeRotateEnded]);
}

#[test]
fn palette_drop_reports_each_new_node() {
    let harness = Harness::new(DiagramState::default());
    let events = harness.run(
        ActionType::PaletteDropNode,
        StateUpdate::add_nodes(vec![Node::new("fresh")]),
    );

    assert_eq!(
        events,
        vec![DiagramEvent::PaletteItemDropped {
            node: Node::new("fresh"),
        }]
    );
}

#[test]
fn init_is_handed_back_instead_of_queued() {
    let events = EventManager::new();
    let mut ctx = TransactionContext::new(
        vec![ActionType::Init],
        StateUpdate::add_nodes(vec![Node::new("a")]),
        Arc::new(DiagramState::default()),
        ActionStateManager::new(EventManager::new()),
        MeasurementTracker::default(),
        Arc::new(EngineConfig::default()),
    );
    ctx.commit();

    DiagramInitEmitter.emit(&ctx, &events).expect("init");

    assert_eq!(events.pending_deferred_count(), 0);
    let held = ctx.take_settle_events();
    assert_eq!(kinds(&held), vec![EventKind::DiagramInitialized]);
}

#[test]
fn init_produces_nothing_through_the_flush() {
    let harness = Harness::new(DiagramState::default());
    let events = harness.run(ActionType::Init, StateUpdate::add_nodes(vec![Node::new("a")]));

    assert!(events.is_empty());
}

#[test]
fn data_only_updates_emit_nothing() {
    let harness = Harness::new(two_nodes());
    let events = harness.run(
        ActionType::UpdateNode,
        StateUpdate::update_nodes(vec![NodePatch {
            data: Some(serde_json::json!({ "label": "renamed" })),
            ..NodePatch::new("a")
        }]),
    );

    assert!(events.is_empty());
}

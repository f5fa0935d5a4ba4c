use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Edge, EdgePatch, Metadata, MetadataPatch, Node, NodePatch};

/// Sparse diff requested against a [`DiagramState`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_to_add: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_to_update: Option<Vec<NodePatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_to_remove: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges_to_add: Option<Vec<Edge>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges_to_update: Option<Vec<EdgePatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges_to_remove: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_update: Option<MetadataPatch>,
}

impl StateUpdate {
    pub fn add_nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes_to_add: Some(nodes),
            ..Self::default()
        }
    }

    pub fn update_nodes(patches: Vec<NodePatch>) -> Self {
        Self {
            nodes_to_update: Some(patches),
            ..Self::default()
        }
    }

    pub fn remove_nodes(ids: Vec<String>) -> Self {
        Self {
            nodes_to_remove: Some(ids),
            ..Self::default()
        }
    }

    pub fn add_edges(edges: Vec<Edge>) -> Self {
        Self {
            edges_to_add: Some(edges),
            ..Self::default()
        }
    }

    pub fn update_edges(patches: Vec<EdgePatch>) -> Self {
        Self {
            edges_to_update: Some(patches),
            ..Self::default()
        }
    }

    pub fn remove_edges(ids: Vec<String>) -> Self {
        Self {
            edges_to_remove: Some(ids),
            ..Self::default()
        }
    }

    pub fn metadata(patch: MetadataPatch) -> Self {
        Self {
            metadata_update: Some(patch),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        is_empty_list(&self.nodes_to_add)
            && is_empty_list(&self.nodes_to_update)
            && is_empty_list(&self.nodes_to_remove)
            && is_empty_list(&self.edges_to_add)
            && is_empty_list(&self.edges_to_update)
            && is_empty_list(&self.edges_to_remove)
            && self.metadata_update.is_none()
    }

    /// Ids named in the node add and update lists, add list first, without duplicates.
    pub fn touched_node_ids(&self) -> Vec<String> {
        let added = self.nodes_to_add.iter().flatten().map(|node| &node.id);
        let updated = self.nodes_to_update.iter().flatten().map(|patch| &patch.id);
        dedup_ids(added.chain(updated))
    }

    pub fn touched_edge_ids(&self) -> Vec<String> {
        let added = self.edges_to_add.iter().flatten().map(|edge| &edge.id);
        let updated = self.edges_to_update.iter().flatten().map(|patch| &patch.id);
        dedup_ids(added.chain(updated))
    }

    /// Folds `later` into this diff. Lists are concatenated; patches for an id
    /// already present are merged field-wise.
    pub fn merge(&mut self, later: StateUpdate) {
        extend_list(&mut self.nodes_to_add, later.nodes_to_add);
        extend_list(&mut self.nodes_to_remove, later.nodes_to_remove);
        extend_list(&mut self.edges_to_add, later.edges_to_add);
        extend_list(&mut self.edges_to_remove, later.edges_to_remove);

        if let Some(patches) = later.nodes_to_update {
            let target = self.nodes_to_update.get_or_insert_with(Vec::new);
            for patch in patches {
                match target.iter_mut().find(|existing| existing.id == patch.id) {
                    Some(existing) => existing.merge(patch),
                    None => target.push(patch),
                }
            }
        }
        if let Some(patches) = later.edges_to_update {
            let target = self.edges_to_update.get_or_insert_with(Vec::new);
            for patch in patches {
                match target.iter_mut().find(|existing| existing.id == patch.id) {
                    Some(existing) => existing.merge(patch),
                    None => target.push(patch),
                }
            }
        }
        if let Some(patch) = later.metadata_update {
            match &mut self.metadata_update {
                Some(existing) => existing.merge(patch),
                None => self.metadata_update = Some(patch),
            }
        }
    }
}

fn is_empty_list<T>(list: &Option<Vec<T>>) -> bool {
    list.as_ref().map_or(true, Vec::is_empty)
}

fn extend_list<T>(target: &mut Option<Vec<T>>, items: Option<Vec<T>>) {
    if let Some(items) = items {
        target.get_or_insert_with(Vec::new).extend(items);
    }
}

fn dedup_ids<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

/// Full committed diagram state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiagramState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub metadata: Metadata,
}

impl DiagramState {
    /// Returns the state produced by `update`. Removals run first, then
    /// patches, then additions; adding an id that already exists replaces the
    /// entity in place. Patches for unknown ids are ignored.
    pub fn apply(&self, update: &StateUpdate) -> DiagramState {
        let mut next = self.clone();

        if let Some(ids) = &update.nodes_to_remove {
            let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
            next.nodes.retain(|node| !ids.contains(node.id.as_str()));
        }
        if let Some(ids) = &update.edges_to_remove {
            let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
            next.edges.retain(|edge| !ids.contains(edge.id.as_str()));
        }

        if let Some(patches) = &update.nodes_to_update {
            for patch in patches {
                if let Some(node) = next.nodes.iter_mut().find(|node| node.id == patch.id) {
                    patch.apply_to(node);
                }
            }
        }
        if let Some(patches) = &update.edges_to_update {
            for patch in patches {
                if let Some(edge) = next.edges.iter_mut().find(|edge| edge.id == patch.id) {
                    patch.apply_to(edge);
                }
            }
        }

        for node in update.nodes_to_add.iter().flatten() {
            match next.nodes.iter_mut().find(|existing| existing.id == node.id) {
                Some(existing) => *existing = node.clone(),
                None => next.nodes.push(node.clone()),
            }
        }
        for edge in update.edges_to_add.iter().flatten() {
            match next.edges.iter_mut().find(|existing| existing.id == edge.id) {
                Some(existing) => *existing = edge.clone(),
                None => next.edges.push(edge.clone()),
            }
        }

        if let Some(patch) = &update.metadata_update {
            patch.apply_to(&mut next.metadata);
        }

        next
    }

    pub fn node_map(&self) -> HashMap<String, Node> {
        self.nodes
            .iter()
            .map(|node| (node.id.clone(), node.clone()))
            .collect()
    }

    pub fn edge_map(&self) -> HashMap<String, Edge> {
        self.edges
            .iter()
            .map(|edge| (edge.id.clone(), edge.clone()))
            .collect()
    }

    pub fn selected_node_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.selected)
            .map(|node| node.id.clone())
            .collect()
    }

    pub fn selected_edge_ids(&self) -> Vec<String> {
        self.edges
            .iter()
            .filter(|edge| edge.selected)
            .map(|edge| edge.id.clone())
            .collect()
    }
}

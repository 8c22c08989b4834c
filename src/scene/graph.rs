//! Parent-child node hierarchy.
//!
//! Every node stores only its local pose; world poses are composed on read by
//! walking up the parent chain, so a moved parent is always reflected in its
//! descendants without any propagation step.

use std::collections::HashMap;

use crate::error::{contract_violation, RenderError, RenderResult};
use crate::math::Pose;
use crate::scene::object::ObjectId;

#[derive(Debug, Clone, Default)]
struct NodeLinks {
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    local: Pose,
}

/// Forest of scene nodes keyed by object id.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: HashMap<ObjectId, NodeLinks>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detached node.
    pub fn insert(&mut self, id: ObjectId) -> RenderResult<()> {
        if self.nodes.contains_key(&id) {
            return Err(RenderError::DuplicateId(id.0));
        }
        self.nodes.insert(id, NodeLinks::default());
        Ok(())
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// True if `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    ///
    /// The child's local pose is kept, so its world pose follows the new parent.
    pub fn add_child(&mut self, parent: ObjectId, child: ObjectId) -> RenderResult<()> {
        if !self.contains(parent) {
            return Err(RenderError::UnknownObject(parent.0));
        }
        if !self.contains(child) {
            return Err(RenderError::UnknownObject(child.0));
        }
        if self.is_ancestor(child, parent) {
            return contract_violation(format!(
                "attaching node {child} under {parent} would create a cycle"
            ));
        }
        if self.parent(child) == Some(parent) {
            return Ok(());
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        Ok(())
    }

    /// Detach `child` from `parent`. Returns false if it was not a child.
    pub fn remove_child(&mut self, parent: ObjectId, child: ObjectId) -> bool {
        if self.parent(child) != Some(parent) {
            return false;
        }
        self.detach(child);
        true
    }

    /// Detach `id` from whatever parent it has.
    pub fn detach(&mut self, id: ObjectId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
    }

    /// Remove a single node, detaching its children. Use [`NodeGraph::subtree_post_order`]
    /// to remove whole subtrees.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        self.detach(id);
        let Some(node) = self.nodes.remove(&id) else {
            return false;
        };
        for child in node.children {
            if let Some(child) = self.nodes.get_mut(&child) {
                child.parent = None;
            }
        }
        true
    }

    /// `id` and all of its descendants, children before parents.
    pub fn subtree_post_order(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        if self.contains(id) {
            self.collect_post_order(id, &mut out);
        }
        out
    }

    fn collect_post_order(&self, id: ObjectId, out: &mut Vec<ObjectId>) {
        for child in self.children(id) {
            self.collect_post_order(*child, out);
        }
        out.push(id);
    }

    pub fn local_pose(&self, id: ObjectId) -> Option<Pose> {
        self.nodes.get(&id).map(|n| n.local)
    }

    pub fn set_local_pose(&mut self, id: ObjectId, pose: Pose) -> RenderResult<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(RenderError::UnknownObject(id.0))?;
        node.local = pose;
        Ok(())
    }

    /// Compose local poses from the root down to `id`.
    pub fn world_pose(&self, id: ObjectId) -> Option<Pose> {
        let mut pose = self.local_pose(id)?;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            let parent_local = self.local_pose(parent)?;
            pose = parent_local.compose(&pose);
            current = self.parent(parent);
        }
        Some(pose)
    }

    /// Set the local pose such that the world pose equals `world`.
    pub fn set_world_pose(&mut self, id: ObjectId, world: Pose) -> RenderResult<()> {
        let local = match self.parent(id).and_then(|p| self.world_pose(p)) {
            Some(parent_world) => parent_world.relative(&world),
            None => world,
        };
        self.set_local_pose(id, local)
    }
}

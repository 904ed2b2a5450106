//! # Scene — The Display Hierarchy
//!
//! The [`Stage`] owns every [`Node`] in an arena and arranges them into a
//! tree of ordered [`DisplayList`]s. The tree decides two things each frame:
//!
//! - **world transforms**: each node's matrix composed with its ancestors',
//! - **paint order**: a depth-first walk where a parent paints before its
//!   children and later siblings paint on top of earlier ones.
//!
//! ## Ownership
//!
//! ```text
//! Stage
//! ├── nodes: NodeArena<Node>      owns every node
//! ├── roots: DisplayList            top-level paint order
//! └── Node
//!     ├── parent: Option<NodeId>    lookup only, never ownership
//!     └── children: DisplayList     ordered ids of child slots
//! ```
//!
//! Parents and children refer to each other by [`NodeId`], so there are no
//! reference cycles to break and removing a node is just emptying arena slots.
//!
//! ## Per-Frame Flow
//!
//! ```text
//! stage.depth_sort()          run any sorts queued by set_depth()
//! stage.update_transforms()   DFS, recompute stale world matrices,
//!                             fold alpha and visibility down the tree
//! stage.iter_visible()        paint order for the renderer
//! ```

mod display_list;
mod handle;
mod node;

pub use display_list::DisplayList;
pub use handle::NodeId;
pub use node::{Color, Node, Sprite};

use handle::NodeArena;

use crate::math::{Matrix2D, Vec2};
use crate::transform::ParentWorld;

/// Arena-backed display hierarchy.
pub struct Stage {
    nodes: NodeArena<Node>,
    roots: DisplayList,
}

impl Stage {
    pub fn new() -> Self {
        Self {
            nodes: NodeArena::new(),
            roots: DisplayList::new(),
        }
    }

    fn list_mut(&mut self, parent: Option<NodeId>) -> Option<&mut DisplayList> {
        match parent {
            None => Some(&mut self.roots),
            Some(p) => self.get_mut(p).map(|n| &mut n.children),
        }
    }

    /// Add a top-level node on top of everything else.
    pub fn add(&mut self, node: Node) -> NodeId {
        self.attach(None, node, None)
    }

    /// Add a top-level node at a paint-order index (clamped).
    pub fn add_at(&mut self, node: Node, index: usize) -> NodeId {
        self.attach(None, node, Some(index))
    }

    /// Add `node` under `parent`, appended or at `index`. Returns `None` if
    /// `parent` is not alive.
    pub fn add_child(&mut self, parent: NodeId, node: Node, index: Option<usize>) -> Option<NodeId> {
        if !self.contains(parent) {
            return None;
        }
        Some(self.attach(Some(parent), node, index))
    }

    fn attach(&mut self, parent: Option<NodeId>, mut node: Node, index: Option<usize>) -> NodeId {
        node.parent = parent;
        node.children = DisplayList::new();
        node.transform.invalidate_world();
        let id = self.nodes.insert(node);
        if let Some(list) = self.list_mut(parent) {
            list.add(id, index);
            list.queue_depth_sort();
        }
        id
    }

    /// Remove a node and its whole subtree. Returns `false` for stale ids.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.get(id).map(|n| n.parent) else {
            return false;
        };
        if let Some(list) = self.list_mut(parent) {
            list.remove(id);
        }

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(mut node) = self.nodes.remove(current) {
                pending.extend(node.children.clear());
            }
        }
        true
    }

    /// Move `id` under `new_parent` (`None` for top level) at `index`.
    ///
    /// Rejects stale ids and moves that would make a node its own ancestor.
    pub fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>, index: Option<usize>) -> bool {
        let Some(old_parent) = self.get(id).map(|n| n.parent) else {
            return false;
        };
        if let Some(p) = new_parent {
            if !self.contains(p) || p == id || self.is_ancestor(id, p) {
                return false;
            }
        }

        if let Some(list) = self.list_mut(old_parent) {
            list.remove(id);
        }
        if let Some(list) = self.list_mut(new_parent) {
            list.add(id, index);
            list.queue_depth_sort();
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = new_parent;
            node.transform.invalidate_world();
        }
        true
    }

    /// True if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.get(p).and_then(|n| n.parent);
        }
        false
    }

    /// Move a node to `index` within its current sibling list.
    pub fn move_to(&mut self, id: NodeId, index: usize) -> bool {
        let Some(parent) = self.get(id).map(|n| n.parent) else {
            return false;
        };
        self.list_mut(parent)
            .is_some_and(|list| list.move_to(id, index))
    }

    /// Change a node's depth and queue a sort of its sibling list.
    pub fn set_depth(&mut self, id: NodeId, depth: f32) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        node.depth = depth;
        let parent = node.parent;
        self.queue_depth_sort(parent);
        true
    }

    /// Mark the child list of `parent` (`None` for the top level) for sorting.
    pub fn queue_depth_sort(&mut self, parent: Option<NodeId>) {
        if let Some(list) = self.list_mut(parent) {
            list.queue_depth_sort();
        }
    }

    /// Run every queued sibling sort. Lists that were not queued are left
    /// alone, so calling this twice in a row is a no-op the second time.
    /// Returns the number of lists sorted.
    pub fn depth_sort(&mut self) -> usize {
        let mut sorted = 0;

        let nodes = &self.nodes;
        if self.roots.depth_sort(|id| depth_in(nodes, id)) {
            sorted += 1;
        }

        for parent in self.nodes.ids() {
            let mut list = match self.nodes.get_mut(parent) {
                Some(node) if node.children.is_sort_queued() => std::mem::take(&mut node.children),
                _ => continue,
            };
            let nodes = &self.nodes;
            if list.depth_sort(|id| depth_in(nodes, id)) {
                sorted += 1;
            }
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children = list;
            }
        }
        sorted
    }

    /// Recompute stale world matrices and fold alpha/visibility down the
    /// tree. Returns how many world matrices were actually recomputed.
    pub fn update_transforms(&mut self) -> usize {
        let mut recomputed = 0;
        let mut stack: Vec<(NodeId, Option<ParentWorld>, f32, bool)> = self
            .roots
            .iter()
            .rev()
            .map(|id| (id, None, 1.0, true))
            .collect();

        while let Some((id, parent_world, parent_alpha, parent_visible)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            let before = node.transform.world_generation();
            let world = node.transform.world(parent_world);
            if node.transform.world_generation() != before {
                recomputed += 1;
            }
            node.world_alpha = parent_alpha * node.alpha;
            node.world_visible = parent_visible && node.visible;

            let (alpha, visible) = (node.world_alpha, node.world_visible);
            for child in node.children.as_slice().iter().rev() {
                stack.push((*child, Some(world), alpha, visible));
            }
        }
        recomputed
    }

    /// The world matrix of one node, resolving (and caching) its ancestor
    /// chain on demand.
    pub fn world_matrix(&mut self, id: NodeId) -> Option<Matrix2D> {
        if !self.contains(id) {
            return None;
        }
        let mut chain = vec![id];
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(p) = current {
            chain.push(p);
            current = self.get(p).and_then(|n| n.parent);
        }

        let mut parent_world = None;
        for node_id in chain.into_iter().rev() {
            let node = self.get_mut(node_id)?;
            parent_world = Some(node.transform.world(parent_world));
        }
        parent_world.map(|w| w.matrix)
    }

    /// Map a world-space point into the node's local space. `None` for stale
    /// ids and for nodes whose world matrix is singular (scaled to zero).
    pub fn to_local(&mut self, id: NodeId, x: f32, y: f32) -> Option<Vec2> {
        let inverse = self.world_matrix(id)?.invert()?;
        Some(inverse.transform_point(x, y))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Children of `parent`, or the top-level list for `None`.
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => self.roots.as_slice(),
            Some(p) => self.get(p).map(|n| n.children.as_slice()).unwrap_or(&[]),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every node in paint order. The iterator is lazy and borrows the
    /// stage; call `iter()` again to restart.
    pub fn iter(&self) -> PaintOrder<'_> {
        PaintOrder::new(self, false)
    }

    /// Paint order, skipping invisible nodes and their subtrees.
    pub fn iter_visible(&self) -> PaintOrder<'_> {
        PaintOrder::new(self, true)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

fn depth_in(nodes: &NodeArena<Node>, id: NodeId) -> f32 {
    nodes.get(id).map_or(0.0, |n| n.depth)
}

/// Depth-first, parent-before-children traversal of a [`Stage`].
pub struct PaintOrder<'a> {
    stage: &'a Stage,
    stack: Vec<std::slice::Iter<'a, NodeId>>,
    skip_hidden: bool,
}

impl<'a> PaintOrder<'a> {
    fn new(stage: &'a Stage, skip_hidden: bool) -> Self {
        Self {
            stage,
            stack: vec![stage.roots.as_slice().iter()],
            skip_hidden,
        }
    }
}

impl<'a> Iterator for PaintOrder<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let top = self.stack.last_mut()?;
            let Some(&id) = top.next() else {
                self.stack.pop();
                continue;
            };
            let Some(node) = self.stage.get(id) else {
                continue;
            };
            if self.skip_hidden && !node.visible {
                continue;
            }
            self.stack.push(node.children.as_slice().iter());
            return Some(id);
        }
    }
}

//! The component tree.
//!
//! Nodes live in an arena; a [`NodeId`] indexes it. Each node is one project
//! directory holding the components discovered there, a parent link (absent
//! for the root) and its children ordered by path.
//!
//! # Queries
//!
//! Queries select components by capability (see
//! [`Capability`](super::Capability)) and a [`Direction`]:
//!
//! - [`Direction::In`] covers the node and its descendants. `find_first`
//!   searches breadth-first; `find_all` returns matches depth-first in tree
//!   order.
//! - [`Direction::Out`] covers the node and its ancestors, nearest first.
//!
//! Every match is returned as a [`Found`] carrying the node it lives at, since
//! components compute paths relative to their own node.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::capabilities::Capability;
use super::retry::RetryPolicy;
use super::Component;

/// Index of a node in a [`ComponentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: Self = Self(0);
}

/// Traversal sense for tree queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The node and its descendants.
    In,
    /// The node and its ancestors.
    Out,
}

/// A query match: the capability view of a component and its node.
pub struct Found<'t, C: ?Sized> {
    /// Node the component lives at.
    pub node: NodeId,
    /// The component, viewed through the queried capability.
    pub component: &'t C,
}

impl<C: ?Sized> Clone for Found<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: ?Sized> Copy for Found<'_, C> {}

impl<C: ?Sized> fmt::Debug for Found<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Found").field("node", &self.node).finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct TreeNode {
    path: PathBuf,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    components: Vec<Arc<dyn Component>>,
}

/// Project directories and the components discovered in them.
#[derive(Debug)]
pub struct ComponentTree {
    nodes: Vec<TreeNode>,
    focus: NodeId,
    retry: RetryPolicy,
}

impl ComponentTree {
    /// A tree with an empty root at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            nodes: vec![TreeNode {
                path: root.into(),
                parent: None,
                children: Vec::new(),
                components: Vec::new(),
            }],
            focus: NodeId::ROOT,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy used for capability invocations.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Retry policy wrapping every capability invocation.
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Adds an empty child directory under `parent`.
    ///
    /// Children are kept ordered by path.
    pub fn add_child(&mut self, parent: NodeId, path: impl Into<PathBuf>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            path: path.into(),
            parent: Some(parent),
            children: Vec::new(),
            components: Vec::new(),
        });

        let mut children = std::mem::take(&mut self.nodes[parent.0].children);
        let position = children
            .binary_search_by(|child| self.nodes[child.0].path.cmp(&self.nodes[id.0].path))
            .unwrap_or_else(|insert_at| insert_at);
        children.insert(position, id);
        self.nodes[parent.0].children = children;
        id
    }

    /// Appends `component` to `node`.
    pub fn add_component(&mut self, node: NodeId, component: Arc<dyn Component>) {
        self.nodes[node.0].components.push(component);
    }

    /// The root node.
    pub const fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// The node the current command was run from.
    pub const fn focus(&self) -> NodeId {
        self.focus
    }

    /// Sets the node the current command was run from.
    pub fn set_focus(&mut self, node: NodeId) {
        self.focus = node;
    }

    /// Directory of `node`.
    pub fn path(&self, node: NodeId) -> &Path {
        &self.nodes[node.0].path
    }

    /// Parent of `node`, `None` for the root.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Children of `node`, ordered by path.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Components at `node`, in discovery order.
    pub fn components(&self, node: NodeId) -> &[Arc<dyn Component>] {
        &self.nodes[node.0].components
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is only an empty root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[0].components.is_empty()
    }

    /// Node for directory `path`, if it is part of the tree.
    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.path == path).map(NodeId)
    }

    /// Matches of capability `C` at `node` only, optionally by name.
    fn matches_at<'t, C>(
        &'t self,
        node: NodeId,
        name: Option<&str>,
    ) -> impl Iterator<Item = Found<'t, C>> + 't
    where
        C: Capability + ?Sized + 't,
    {
        let name = name.map(str::to_string);
        self.nodes[node.0].components.iter().filter_map(move |component| {
            if name.as_deref().is_some_and(|wanted| component.name() != wanted) {
                return None;
            }
            C::select(component.as_ref()).map(|found| Found {
                node,
                component: found,
            })
        })
    }

    /// First component with capability `C` (and `name`, if given).
    ///
    /// `In` searches breadth-first from `node`; `Out` checks `node` and then
    /// each ancestor in turn. `None` when nothing matches.
    pub fn find_first<'t, C>(
        &'t self,
        node: NodeId,
        direction: Direction,
        name: Option<&str>,
    ) -> Option<Found<'t, C>>
    where
        C: Capability + ?Sized + 't,
    {
        match direction {
            Direction::In => {
                let mut queue = VecDeque::from([node]);
                while let Some(current) = queue.pop_front() {
                    if let Some(found) = self.matches_at::<C>(current, name).next() {
                        return Some(found);
                    }
                    queue.extend(self.children(current).iter().copied());
                }
                None
            }
            Direction::Out => {
                let mut current = Some(node);
                while let Some(id) = current {
                    if let Some(found) = self.matches_at::<C>(id, name).next() {
                        return Some(found);
                    }
                    current = self.parent(id);
                }
                None
            }
        }
    }

    /// Every component with capability `C`.
    ///
    /// `In` lists `node`'s matches followed by each child's `In` matches,
    /// depth-first. `Out` lists `node`'s matches followed by its ancestors',
    /// nearest first.
    pub fn find_all<'t, C>(&'t self, node: NodeId, direction: Direction) -> Vec<Found<'t, C>>
    where
        C: Capability + ?Sized + 't,
    {
        let mut found = Vec::new();
        match direction {
            Direction::In => self.collect_in::<C>(node, &mut found),
            Direction::Out => {
                let mut current = Some(node);
                while let Some(id) = current {
                    found.extend(self.matches_at::<C>(id, None));
                    current = self.parent(id);
                }
            }
        }
        found
    }

    fn collect_in<'t, C>(&'t self, node: NodeId, found: &mut Vec<Found<'t, C>>)
    where
        C: Capability + ?Sized + 't,
    {
        found.extend(self.matches_at::<C>(node, None));
        for &child in self.children(node) {
            self.collect_in::<C>(child, found);
        }
    }

    /// The topmost layer of components with capability `C` under `node`.
    ///
    /// Returns `node`'s matches if it has any; otherwise the concatenation of
    /// each child's result. A branch stops descending at its first layer with
    /// a match.
    pub fn find_all_first_level<'t, C>(&'t self, node: NodeId) -> Vec<Found<'t, C>>
    where
        C: Capability + ?Sized + 't,
    {
        let own: Vec<Found<'t, C>> = self.matches_at::<C>(node, None).collect();
        if !own.is_empty() {
            return own;
        }
        self.children(node).iter().flat_map(|&child| self.find_all_first_level::<C>(child)).collect()
    }

    /// Like [`find_first`](Self::find_first) with a required name, failing
    /// with [`DcError::ComponentNotFound`](crate::core::DcError::ComponentNotFound).
    pub fn require<'t, C>(
        &'t self,
        node: NodeId,
        direction: Direction,
        name: Option<&str>,
    ) -> anyhow::Result<Found<'t, C>>
    where
        C: Capability + ?Sized + 't,
    {
        self.find_first::<C>(node, direction, name).ok_or_else(|| {
            crate::core::DcError::ComponentNotFound {
                capability: C::NAME.to_string(),
                name: name.map(str::to_string),
            }
            .into()
        })
    }
}

use std::fmt;

use slotmap::SecondaryMap;
use thiserror::Error;

use crate::command::Value;

slotmap::new_key_type! {
  /// Stable handle for a node in the document tree.
  ///
  /// Handles are minted by the tree-construction layer; this crate never
  /// creates or destroys nodes, it only keys state off them.
  pub struct NodeId;
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors raised by the identity side table.
///
/// Both variants are programming-contract violations: a node must carry an
/// identity before it participates in any identity-keyed collection, and an
/// identity is assigned at most once for the node's lifetime.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
  #[error("node {0:?} has no assigned identity")]
  Missing(NodeId),
  #[error("node {0:?} already carries identity {1}")]
  AlreadyAssigned(NodeId, NodeIdentity),
}

/// Immutable per-node token used as a collection key in place of structural
/// or reference equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentity(u64);

impl fmt::Display for NodeIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Side table mapping node handles to their identities.
///
/// The tree-construction layer assigns an identity right after creating a
/// node; everything downstream only reads. Identities are never reused
/// within a session.
#[derive(Debug, Clone, Default)]
pub struct IdentityTable {
  ids:  SecondaryMap<NodeId, NodeIdentity>,
  next: u64,
}

impl IdentityTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Assigns a fresh identity to `node`.
  ///
  /// # Errors
  /// Returns [`IdentityError::AlreadyAssigned`] if the node was already
  /// given an identity; identities are immutable once assigned.
  pub fn assign(&mut self, node: NodeId) -> Result<NodeIdentity> {
    if let Some(&existing) = self.ids.get(node) {
      return Err(IdentityError::AlreadyAssigned(node, existing));
    }
    let identity = NodeIdentity(self.next);
    self.next += 1;
    self.ids.insert(node, identity);
    Ok(identity)
  }

  #[inline]
  pub fn get(&self, node: NodeId) -> Option<NodeIdentity> {
    self.ids.get(node).copied()
  }

  /// Looks up the identity of `node`, failing if none was assigned.
  ///
  /// # Errors
  /// Returns [`IdentityError::Missing`] for nodes without an identity; the
  /// absence is never tolerated silently.
  #[inline]
  pub fn require(&self, node: NodeId) -> Result<NodeIdentity> {
    self.get(node).ok_or(IdentityError::Missing(node))
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.ids.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  /// Drops every assignment. The counter keeps running so identities stay
  /// unique across a clear within one session.
  pub fn clear(&mut self) {
    self.ids.clear();
  }
}

/// Read-only structural view of the document tree.
///
/// Implemented by the tree layer; the identity-keyed collections use it for
/// their ancestor/descendant closures.
pub trait TreeView {
  fn parent(&self, node: NodeId) -> Option<NodeId>;
  fn first_child(&self, node: NodeId) -> Option<NodeId>;
  fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
}

/// Key/value property storage on tree nodes.
///
/// The built-in undoable primitives of
/// [`ActionLog`](crate::history::ActionLog) mutate through this seam. The
/// methods are infallible: passing a dead node handle is a contract
/// violation on the caller's side.
pub trait PropertyTarget {
  fn property(&self, node: NodeId, name: &str) -> Option<Value>;
  fn set_property(&mut self, node: NodeId, name: &str, value: Value);
  fn delete_property(&mut self, node: NodeId, name: &str);
}

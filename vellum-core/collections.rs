use std::collections::HashMap;

use crate::tree::{
  IdentityTable,
  NodeId,
  NodeIdentity,
  Result,
  TreeView,
};

/// A set of tree nodes keyed by their assigned identities.
///
/// Membership, insertion, and removal are O(1) hash operations on the
/// identity token, so the set is insensitive to the node being moved or
/// mutated elsewhere in the tree. Every operation that accepts a raw node
/// handle insists the node already carries an identity.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
  members: HashMap<NodeIdentity, NodeId>,
}

impl NodeSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds a set from an ordered sequence of nodes.
  pub fn from_nodes<I>(ids: &IdentityTable, nodes: I) -> Result<Self>
  where
    I: IntoIterator<Item = NodeId>,
  {
    let mut set = NodeSet::new();
    for node in nodes {
      set.add(ids, node)?;
    }
    Ok(set)
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.members.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }

  pub fn add(&mut self, ids: &IdentityTable, node: NodeId) -> Result<()> {
    let identity = ids.require(node)?;
    self.members.insert(identity, node);
    Ok(())
  }

  pub fn remove(&mut self, ids: &IdentityTable, node: NodeId) -> Result<()> {
    let identity = ids.require(node)?;
    self.members.remove(&identity);
    Ok(())
  }

  pub fn contains(&self, ids: &IdentityTable, node: NodeId) -> Result<bool> {
    let identity = ids.require(node)?;
    Ok(self.members.contains_key(&identity))
  }

  /// Visits each current member exactly once, in unspecified order.
  pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.members.values().copied()
  }

  pub fn to_vec(&self) -> Vec<NodeId> {
    self.iter().collect()
  }

  /// Union of the strict ancestors of all members.
  pub fn ancestor(&self, tree: &impl TreeView, ids: &IdentityTable) -> Result<NodeSet> {
    let mut result = NodeSet::new();
    for node in self.iter() {
      let mut up = tree.parent(node);
      while let Some(parent) = up {
        result.add(ids, parent)?;
        up = tree.parent(parent);
      }
    }
    Ok(result)
  }

  /// Union of the members and their strict ancestors.
  pub fn ancestor_or_self(&self, tree: &impl TreeView, ids: &IdentityTable) -> Result<NodeSet> {
    let mut result = NodeSet::new();
    for node in self.iter() {
      let mut up = Some(node);
      while let Some(cur) = up {
        result.add(ids, cur)?;
        up = tree.parent(cur);
      }
    }
    Ok(result)
  }

  /// Union of the proper descendants of all members.
  pub fn descendant(&self, tree: &impl TreeView, ids: &IdentityTable) -> Result<NodeSet> {
    let mut result = NodeSet::new();
    let mut stack = Vec::new();
    for node in self.iter() {
      push_children(tree, node, &mut stack);
      while let Some(next) = stack.pop() {
        result.add(ids, next)?;
        push_children(tree, next, &mut stack);
      }
    }
    Ok(result)
  }

  /// Union of the members and their proper descendants.
  pub fn descendant_or_self(&self, tree: &impl TreeView, ids: &IdentityTable) -> Result<NodeSet> {
    let mut result = NodeSet::new();
    let mut stack = Vec::new();
    for node in self.iter() {
      stack.push(node);
      while let Some(next) = stack.pop() {
        result.add(ids, next)?;
        push_children(tree, next, &mut stack);
      }
    }
    Ok(result)
  }

  pub fn union(&self, other: &NodeSet) -> NodeSet {
    let mut members = self.members.clone();
    members.extend(other.members.iter().map(|(&id, &node)| (id, node)));
    NodeSet { members }
  }

  pub fn intersection(&self, other: &NodeSet) -> NodeSet {
    NodeSet {
      members: self
        .members
        .iter()
        .filter(|(id, _)| other.members.contains_key(id))
        .map(|(&id, &node)| (id, node))
        .collect(),
    }
  }
}

fn push_children(tree: &impl TreeView, node: NodeId, stack: &mut Vec<NodeId>) {
  let mut child = tree.first_child(node);
  while let Some(cur) = child {
    stack.push(cur);
    child = tree.next_sibling(cur);
  }
}

/// An identity-keyed map from tree nodes to values.
///
/// Entries retain the original key handle so [`keys`](NodeMap::keys) can
/// hand back the nodes the map was built from.
#[derive(Debug, Clone)]
pub struct NodeMap<V> {
  entries: HashMap<NodeIdentity, MapEntry<V>>,
}

#[derive(Debug, Clone)]
struct MapEntry<V> {
  key:   NodeId,
  value: V,
}

impl<V> NodeMap<V> {
  pub fn new() -> Self {
    Self {
      entries: HashMap::new(),
    }
  }

  /// Builds a map over `nodes`, computing each value with `value`.
  pub fn from_nodes<I, F>(ids: &IdentityTable, nodes: I, mut value: F) -> Result<Self>
  where
    I: IntoIterator<Item = NodeId>,
    F: FnMut(NodeId) -> V,
  {
    let mut map = NodeMap::new();
    for node in nodes {
      map.put(ids, node, value(node))?;
    }
    Ok(map)
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn get(&self, ids: &IdentityTable, key: NodeId) -> Result<Option<&V>> {
    let identity = ids.require(key)?;
    Ok(self.entries.get(&identity).map(|entry| &entry.value))
  }

  /// Inserts `value` under `key`, overwriting on identity collision.
  /// Returns the prior value, if any.
  pub fn put(&mut self, ids: &IdentityTable, key: NodeId, value: V) -> Result<Option<V>> {
    let identity = ids.require(key)?;
    Ok(
      self
        .entries
        .insert(identity, MapEntry { key, value })
        .map(|entry| entry.value),
    )
  }

  /// Removes both the key and value entries for `key`.
  pub fn remove(&mut self, ids: &IdentityTable, key: NodeId) -> Result<Option<V>> {
    let identity = ids.require(key)?;
    Ok(self.entries.remove(&identity).map(|entry| entry.value))
  }

  pub fn contains_key(&self, ids: &IdentityTable, key: NodeId) -> Result<bool> {
    let identity = ids.require(key)?;
    Ok(self.entries.contains_key(&identity))
  }

  /// The original key handles, in unspecified order.
  pub fn keys(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.entries.values().map(|entry| entry.key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (NodeId, &V)> + '_ {
    self.entries.values().map(|entry| (entry.key, &entry.value))
  }
}

impl<V> Default for NodeMap<V> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod test {
  use slotmap::SlotMap;

  use super::*;
  use crate::tree::IdentityError;

  /// Parent/children arena standing in for the external tree layer.
  #[derive(Default)]
  struct Tree {
    nodes: SlotMap<NodeId, TreeNode>,
  }

  #[derive(Default)]
  struct TreeNode {
    parent:   Option<NodeId>,
    children: Vec<NodeId>,
  }

  impl Tree {
    fn node(&mut self, ids: &mut IdentityTable, parent: Option<NodeId>) -> NodeId {
      let node = self.nodes.insert(TreeNode {
        parent,
        children: Vec::new(),
      });
      if let Some(parent) = parent {
        self.nodes[parent].children.push(node);
      }
      ids.assign(node).unwrap();
      node
    }
  }

  impl TreeView for Tree {
    fn parent(&self, node: NodeId) -> Option<NodeId> {
      self.nodes[node].parent
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
      self.nodes[node].children.first().copied()
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
      let parent = self.nodes[node].parent?;
      let siblings = &self.nodes[parent].children;
      let pos = siblings.iter().position(|&n| n == node)?;
      siblings.get(pos + 1).copied()
    }
  }

  /// doc
  /// ├── body
  /// │   ├── para1
  /// │   │   └── text1
  /// │   └── para2
  /// └── footer
  struct Fixture {
    tree:   Tree,
    ids:    IdentityTable,
    doc:    NodeId,
    body:   NodeId,
    para1:  NodeId,
    para2:  NodeId,
    text1:  NodeId,
    footer: NodeId,
  }

  fn fixture() -> Fixture {
    let mut tree = Tree::default();
    let mut ids = IdentityTable::new();
    let doc = tree.node(&mut ids, None);
    let body = tree.node(&mut ids, Some(doc));
    let para1 = tree.node(&mut ids, Some(body));
    let text1 = tree.node(&mut ids, Some(para1));
    let para2 = tree.node(&mut ids, Some(body));
    let footer = tree.node(&mut ids, Some(doc));
    Fixture {
      tree,
      ids,
      doc,
      body,
      para1,
      para2,
      text1,
      footer,
    }
  }

  fn as_sorted(set: &NodeSet) -> Vec<NodeId> {
    let mut nodes = set.to_vec();
    nodes.sort();
    nodes
  }

  fn set_of(f: &Fixture, nodes: &[NodeId]) -> NodeSet {
    NodeSet::from_nodes(&f.ids, nodes.iter().copied()).unwrap()
  }

  #[test]
  fn membership_basics() {
    let f = fixture();
    let mut set = NodeSet::new();

    set.add(&f.ids, f.para1).unwrap();
    set.add(&f.ids, f.para1).unwrap();
    set.add(&f.ids, f.para2).unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&f.ids, f.para1).unwrap());
    assert!(!set.contains(&f.ids, f.body).unwrap());

    set.remove(&f.ids, f.para1).unwrap();
    assert!(!set.contains(&f.ids, f.para1).unwrap());
    set.remove(&f.ids, f.para1).unwrap();
    assert_eq!(set.len(), 1);
  }

  #[test]
  fn unidentified_nodes_are_rejected() {
    let mut f = fixture();
    let stray = f.tree.nodes.insert(TreeNode::default());

    let mut set = NodeSet::new();
    assert_eq!(set.add(&f.ids, stray), Err(IdentityError::Missing(stray)));
    assert_eq!(set.contains(&f.ids, stray), Err(IdentityError::Missing(stray)));

    let mut map: NodeMap<u32> = NodeMap::new();
    assert_eq!(map.put(&f.ids, stray, 1), Err(IdentityError::Missing(stray)));
  }

  #[test]
  fn iter_visits_each_member_once() {
    let f = fixture();
    let set = set_of(&f, &[f.para1, f.para2, f.footer]);
    let mut seen = set.to_vec();
    seen.sort();
    let mut expected = vec![f.para1, f.para2, f.footer];
    expected.sort();
    assert_eq!(seen, expected);
  }

  #[test]
  fn ancestor_closures() {
    let f = fixture();
    let set = set_of(&f, &[f.text1, f.para2]);

    let ancestors = set.ancestor(&f.tree, &f.ids).unwrap();
    assert_eq!(
      as_sorted(&ancestors),
      as_sorted(&set_of(&f, &[f.doc, f.body, f.para1]))
    );

    let with_self = set.ancestor_or_self(&f.tree, &f.ids).unwrap();
    assert_eq!(
      as_sorted(&with_self),
      as_sorted(&set_of(&f, &[f.doc, f.body, f.para1, f.text1, f.para2]))
    );
  }

  #[test]
  fn descendant_closures() {
    let f = fixture();
    let set = set_of(&f, &[f.body]);

    let descendants = set.descendant(&f.tree, &f.ids).unwrap();
    assert_eq!(
      as_sorted(&descendants),
      as_sorted(&set_of(&f, &[f.para1, f.text1, f.para2]))
    );

    let with_self = set.descendant_or_self(&f.tree, &f.ids).unwrap();
    assert_eq!(
      as_sorted(&with_self),
      as_sorted(&set_of(&f, &[f.body, f.para1, f.text1, f.para2]))
    );
  }

  #[test]
  fn union_and_intersection_follow_set_algebra() {
    let f = fixture();
    let a = set_of(&f, &[f.para1, f.para2]);
    let b = set_of(&f, &[f.para2, f.footer]);

    let union = a.union(&b);
    let intersection = a.intersection(&b);

    for node in [f.doc, f.body, f.para1, f.para2, f.text1, f.footer] {
      let in_a = a.contains(&f.ids, node).unwrap();
      let in_b = b.contains(&f.ids, node).unwrap();
      assert_eq!(union.contains(&f.ids, node).unwrap(), in_a || in_b);
      assert_eq!(intersection.contains(&f.ids, node).unwrap(), in_a && in_b);
    }
  }

  #[test]
  fn map_retains_original_keys() {
    let f = fixture();
    let mut map: NodeMap<&'static str> = NodeMap::new();

    map.put(&f.ids, f.para1, "first").unwrap();
    map.put(&f.ids, f.para2, "second").unwrap();
    assert_eq!(map.get(&f.ids, f.para1).unwrap(), Some(&"first"));
    assert_eq!(map.put(&f.ids, f.para1, "replaced").unwrap(), Some("first"));
    assert_eq!(map.len(), 2);

    let mut keys: Vec<NodeId> = map.keys().collect();
    keys.sort();
    let mut expected = vec![f.para1, f.para2];
    expected.sort();
    assert_eq!(keys, expected);

    assert_eq!(map.remove(&f.ids, f.para1).unwrap(), Some("replaced"));
    assert!(!map.contains_key(&f.ids, f.para1).unwrap());
    assert_eq!(map.get(&f.ids, f.para1).unwrap(), None);
  }

  #[test]
  fn map_from_nodes_applies_value_fn() {
    let f = fixture();
    let map = NodeMap::from_nodes(&f.ids, [f.para1, f.para2], |node| {
      f.tree.nodes[node].parent
    })
    .unwrap();
    assert_eq!(map.get(&f.ids, f.para1).unwrap(), Some(&Some(f.body)));

    // The unit-valued form mirrors building a map purely for key lookup.
    let marks = NodeMap::from_nodes(&f.ids, [f.footer], |_| ()).unwrap();
    assert!(marks.contains_key(&f.ids, f.footer).unwrap());
  }
}

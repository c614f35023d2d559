use std::{
  collections::HashMap,
  fmt,
};

use smallvec::SmallVec;

use crate::{
  Tendril,
  history::{
    ActionLog,
    Result,
  },
  tree::NodeId,
};

/// Identifier of a registered undoable operation.
///
/// Replay records carry an `OpId` instead of a function reference; the
/// [`OpTable`] resolves it when the record is replayed. Ids are plain static
/// strings so logs and errors stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(&'static str);

impl OpId {
  #[inline]
  pub const fn new(name: &'static str) -> Self {
    Self(name)
  }

  #[inline]
  pub fn name(&self) -> &'static str {
    self.0
  }
}

impl fmt::Display for OpId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0)
  }
}

/// A captured argument value of a replay record.
///
/// Closed tagged variant: everything an inverse operation needs to replay
/// must be expressible here, which keeps records serializable-shaped and
/// free of call-site closures.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Str(Tendril),
  Node(NodeId),
}

impl Value {
  #[inline]
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  #[inline]
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  #[inline]
  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(n) => Some(*n),
      _ => None,
    }
  }

  #[inline]
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  #[inline]
  pub fn as_node(&self) -> Option<NodeId> {
    match self {
      Value::Node(node) => Some(*node),
      _ => None,
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Value::Int(n)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Str(s.into())
  }
}

impl From<Tendril> for Value {
  fn from(s: Tendril) -> Self {
    Value::Str(s)
  }
}

impl From<NodeId> for Value {
  fn from(node: NodeId) -> Self {
    Value::Node(node)
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => f.write_str("null"),
      Value::Bool(b) => write!(f, "{b}"),
      Value::Int(n) => write!(f, "{n}"),
      Value::Str(s) => write!(f, "{s:?}"),
      Value::Node(node) => write!(f, "{node:?}"),
    }
  }
}

/// Captured argument tuple of a replay record.
///
/// Most inverse operations take a node, a name, and a value or two; four
/// inline slots cover that without heap traffic.
pub type ArgList = SmallVec<[Value; 4]>;

/// A registered operation: mutates the target and logs its own inverse
/// through the provided log.
pub type OpFn<T> = fn(&mut T, &mut ActionLog<T>, &[Value]) -> Result<()>;

/// The registered-operation table.
///
/// The mutation layer registers every primitive whose inverse can appear in
/// a replay record. Replaying a record whose id was never registered is a
/// contract violation reported by the log.
pub struct OpTable<T> {
  ops: HashMap<OpId, OpFn<T>>,
}

impl<T> OpTable<T> {
  pub fn new() -> Self {
    Self {
      ops: HashMap::new(),
    }
  }

  /// Registers `f` under `op`, replacing any previous registration.
  pub fn register(&mut self, op: OpId, f: OpFn<T>) {
    self.ops.insert(op, f);
  }

  #[inline]
  pub fn get(&self, op: OpId) -> Option<OpFn<T>> {
    self.ops.get(&op).copied()
  }

  #[inline]
  pub fn contains(&self, op: OpId) -> bool {
    self.ops.contains_key(&op)
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.ops.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }
}

impl<T> Default for OpTable<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for OpTable<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.ops.keys()).finish()
  }
}

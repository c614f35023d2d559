use std::{
  cmp::Ordering,
  collections::VecDeque,
  fmt,
  mem,
};

use smallvec::smallvec;
use thiserror::Error;

use crate::{
  Tendril,
  command::{
    ArgList,
    OpId,
    OpTable,
    Value,
  },
  tree::{
    NodeId,
    PropertyTarget,
  },
};

/// Maximum number of groups retained on the undo stack. Recording past the
/// limit evicts the oldest group.
const UNDO_LIMIT: usize = 50;

/// Label given to groups opened implicitly by the first action after a
/// close.
const ANONYMOUS: &str = "Anonymous";

/// Built-in primitive restoring a node property to a prior value.
pub const OP_SET_PROPERTY: OpId = OpId::new("set-property");
/// Built-in primitive removing a node property that did not exist.
pub const OP_DELETE_PROPERTY: OpId = OpId::new("delete-property");

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors that can occur while recording or replaying history.
#[derive(Debug, Error)]
pub enum HistoryError {
  #[error("no operation registered under id \"{0}\"")]
  UnknownOperation(OpId),
  #[error("operation \"{op}\" received an unusable argument at position {index}")]
  BadArgument { op: OpId, index: usize },
  #[error("undo/redo replay is not reentrant")]
  NestedReplay,
  #[error("undo index {index} is unreachable ({undo} undo / {redo} redo groups)")]
  IndexUnreachable {
    index: usize,
    undo:  usize,
    redo:  usize,
  },
  #[error(transparent)]
  Action(Box<dyn std::error::Error + Send + Sync>),
}

/// One logged inverse of a single low-level mutation.
#[derive(Debug, Clone)]
pub struct ActionRecord {
  pub op:   OpId,
  pub args: ArgList,
}

impl fmt::Display for ActionRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}(", self.op)?;
    for (i, arg) in self.args.iter().enumerate() {
      if i > 0 {
        f.write_str(",")?;
      }
      write!(f, "{arg}")?;
    }
    f.write_str(")")
  }
}

/// An atomic, ordered batch of records undone or redone as a single unit.
#[derive(Debug, Clone)]
pub struct ActionGroup {
  label:   Tendril,
  records: Vec<ActionRecord>,
}

impl ActionGroup {
  #[inline]
  pub fn label(&self) -> &str {
    &self.label
  }

  #[inline]
  pub fn records(&self) -> &[ActionRecord] {
    &self.records
  }
}

/// Callback fired when a group is closed.
pub type OnClose<T> = Box<dyn FnOnce(&mut T)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
  None,
  Undo,
  Redo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackKind {
  Undo,
  Redo,
}

/// Where the currently open group lives.
///
/// A group is held detached until its first record; pushing it onto a stack
/// only then keeps empty groups out of the history entirely.
enum GroupSlot {
  Detached(ActionGroup),
  /// The group sits at the top of the given stack and receives further
  /// records there.
  Pushed(StackKind),
}

struct OpenGroup<T> {
  slot:     GroupSlot,
  on_close: Option<OnClose<T>>,
}

/// The undo/redo action log.
///
/// Every low-level mutation of the target `T` logs its inverse here right
/// after applying itself; user-visible steps are delimited with
/// [`new_group`](ActionLog::new_group). Undoing replays the most recent
/// group in reverse record order, and anything those inverses log lands on
/// the redo stack (and vice versa during redo).
///
/// The log is private to a single editing session and never shared across
/// documents.
pub struct ActionLog<T> {
  undo_stack: VecDeque<ActionGroup>,
  redo_stack: Vec<ActionGroup>,
  current:    Option<OpenGroup<T>>,
  replay:     Replay,
  disabled:   u32,
  ops:        OpTable<T>,
}

impl<T> ActionLog<T> {
  /// Creates a log with the given registered-operation table.
  pub fn with_ops(ops: OpTable<T>) -> Self {
    Self {
      undo_stack: VecDeque::new(),
      redo_stack: Vec::new(),
      current: None,
      replay: Replay::None,
      disabled: 0,
      ops,
    }
  }

  /// Registers `f` as the replay implementation of `op`.
  pub fn register(&mut self, op: OpId, f: crate::command::OpFn<T>) {
    self.ops.register(op, f);
  }

  /// Number of groups an undo would walk back through.
  #[inline]
  pub fn index(&self) -> usize {
    self.undo_stack.len()
  }

  /// Total number of recorded groups on both stacks.
  #[inline]
  pub fn len(&self) -> usize {
    self.undo_stack.len() + self.redo_stack.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  pub fn redo_depth(&self) -> usize {
    self.redo_stack.len()
  }

  /// True while an undo or redo replay is executing.
  #[inline]
  pub fn is_active(&self) -> bool {
    self.replay != Replay::None
  }

  /// True while recording is suppressed.
  #[inline]
  pub fn is_disabled(&self) -> bool {
    self.disabled > 0
  }

  /// Label of the most recent undo-stack group.
  pub fn group_type(&self) -> Option<&str> {
    self.undo_stack.back().map(ActionGroup::label)
  }

  /// Drops all recorded history, including a still-open group. Close
  /// callbacks do not fire.
  pub fn clear(&mut self) {
    self.undo_stack.clear();
    self.redo_stack.clear();
    self.current = None;
  }

  /// Closes the current group and opens a new, empty one.
  ///
  /// The new group is not recorded anywhere until it receives its first
  /// action. An empty label reads as "Anonymous". No-op while suppressed.
  pub fn new_group(&mut self, target: &mut T, label: &str) {
    self.new_group_with(target, label, None);
  }

  /// Like [`new_group`](ActionLog::new_group), with a callback fired when
  /// the group is closed again.
  pub fn new_group_with(&mut self, target: &mut T, label: &str, on_close: Option<OnClose<T>>) {
    if self.disabled > 0 {
      return;
    }
    self.close_current_group(target);
    self.open_group(label, on_close);
  }

  /// Appends an inverse record to the current group, opening an anonymous
  /// group if none is open.
  ///
  /// Recording outside a replay invalidates the redo stack. On a group's
  /// first record the group is pushed onto the active stack (the undo
  /// stack during normal editing and redo replay, the redo stack during
  /// undo replay), evicting the oldest undo group at capacity during
  /// normal editing only. No-op while suppressed.
  pub fn add_action(&mut self, op: OpId, args: ArgList) {
    if self.disabled > 0 {
      return;
    }

    if self.replay == Replay::None && !self.redo_stack.is_empty() {
      self.redo_stack.clear();
    }

    if self.current.is_none() {
      self.open_group("", None);
    }

    let record = ActionRecord { op, args };
    let pushed_kind = match self.current.as_ref().map(|open| &open.slot) {
      Some(GroupSlot::Pushed(kind)) => Some(*kind),
      _ => None,
    };

    match pushed_kind {
      Some(kind) => {
        if let Some(group) = self.top_group_mut(kind) {
          group.records.push(record);
        }
      },
      None => {
        let kind = match self.replay {
          Replay::Undo => StackKind::Redo,
          Replay::None | Replay::Redo => StackKind::Undo,
        };
        if self.replay == Replay::None && self.undo_stack.len() == UNDO_LIMIT {
          self.undo_stack.pop_front();
        }
        let detached = match self.current.as_mut() {
          Some(open) => mem::replace(&mut open.slot, GroupSlot::Pushed(kind)),
          None => return,
        };
        if let GroupSlot::Detached(mut group) = detached {
          group.records.push(record);
          self.push_group(kind, group);
        }
      },
    }
  }

  /// Reverts the most recent undo-stack group.
  ///
  /// Records replay in reverse order (most recent sub-edit first); the
  /// inverses they log land on the redo stack. An empty undo stack is a
  /// safe no-op.
  ///
  /// # Errors
  /// Fails on nested replay, unknown operation ids, or an operation error;
  /// a failure mid-replay leaves the target partially reverted.
  pub fn undo(&mut self, target: &mut T) -> Result<()> {
    if self.replay != Replay::None {
      return Err(HistoryError::NestedReplay);
    }
    self.close_current_group(target);
    if let Some(group) = self.undo_stack.pop_back() {
      tracing::trace!("undo group \"{}\" ({} records)", group.label(), group.records.len());
      self.replay = Replay::Undo;
      let result = self.replay_group(target, &group);
      self.replay = Replay::None;
      // The group the replayed inverses opened sits on the redo stack; it
      // must be closed on failure too, or the next record would target a
      // stack top that no longer matches.
      self.close_current_group(target);
      result?;
    }
    Ok(())
  }

  /// Re-applies the most recent redo-stack group. Symmetric to
  /// [`undo`](ActionLog::undo), routing freshly logged inverses to the
  /// undo stack.
  pub fn redo(&mut self, target: &mut T) -> Result<()> {
    if self.replay != Replay::None {
      return Err(HistoryError::NestedReplay);
    }
    self.close_current_group(target);
    if let Some(group) = self.redo_stack.pop() {
      tracing::trace!("redo group \"{}\" ({} records)", group.label(), group.records.len());
      self.replay = Replay::Redo;
      let result = self.replay_group(target, &group);
      self.replay = Replay::None;
      self.close_current_group(target);
      result?;
    }
    Ok(())
  }

  /// Undoes or redoes until the undo depth equals `index`.
  ///
  /// # Errors
  /// Returns [`HistoryError::IndexUnreachable`] if a step makes no
  /// progress, which happens when `index` exceeds what the redo stack can
  /// provide.
  pub fn set_index(&mut self, target: &mut T, index: usize) -> Result<()> {
    loop {
      let depth = self.undo_stack.len();
      match depth.cmp(&index) {
        Ordering::Equal => return Ok(()),
        Ordering::Greater => self.undo(target)?,
        Ordering::Less => self.redo(target)?,
      }
      if self.undo_stack.len() == depth {
        return Err(HistoryError::IndexUnreachable {
          index,
          undo: self.undo_stack.len(),
          redo: self.redo_stack.len(),
        });
      }
    }
  }

  /// Runs `f` with recording suppressed.
  ///
  /// The suppression counter nests and is restored on both the `Ok` and
  /// `Err` exit paths.
  pub fn disable_while_executing<R>(
    &mut self,
    f: impl FnOnce(&mut Self) -> Result<R>,
  ) -> Result<R> {
    self.disabled += 1;
    let result = f(self);
    self.disabled -= 1;
    result
  }

  fn open_group(&mut self, label: &str, on_close: Option<OnClose<T>>) {
    let label = if label.is_empty() { ANONYMOUS } else { label };
    self.current = Some(OpenGroup {
      slot: GroupSlot::Detached(ActionGroup {
        label:   label.into(),
        records: Vec::new(),
      }),
      on_close,
    });
  }

  /// Closing an already-closed group is a safe no-op.
  fn close_current_group(&mut self, target: &mut T) {
    if let Some(open) = self.current.take()
      && let Some(on_close) = open.on_close
    {
      on_close(target);
    }
  }

  fn replay_group(&mut self, target: &mut T, group: &ActionGroup) -> Result<()> {
    for record in group.records.iter().rev() {
      let op = self
        .ops
        .get(record.op)
        .ok_or(HistoryError::UnknownOperation(record.op))?;
      op(target, self, &record.args)?;
    }
    Ok(())
  }

  fn push_group(&mut self, kind: StackKind, group: ActionGroup) {
    match kind {
      StackKind::Undo => self.undo_stack.push_back(group),
      StackKind::Redo => self.redo_stack.push(group),
    }
  }

  fn top_group_mut(&mut self, kind: StackKind) -> Option<&mut ActionGroup> {
    match kind {
      StackKind::Undo => self.undo_stack.back_mut(),
      StackKind::Redo => self.redo_stack.last_mut(),
    }
  }
}

impl<T: PropertyTarget> ActionLog<T> {
  /// Creates a log with the built-in property primitives pre-registered.
  pub fn new() -> Self {
    let mut ops = OpTable::new();
    ops.register(OP_SET_PROPERTY, op_set_property::<T>);
    ops.register(OP_DELETE_PROPERTY, op_delete_property::<T>);
    Self::with_ops(ops)
  }

  /// Undoable key/value mutation: sets `name` on `node`, logging the prior
  /// value (or its absence) as the inverse. Setting a property to its
  /// current value records nothing.
  pub fn set_property(&mut self, target: &mut T, node: NodeId, name: &str, value: Value) {
    if target.property(node, name).as_ref() == Some(&value) {
      return;
    }
    self.save_property(target, node, name);
    target.set_property(node, name, value);
  }

  /// Undoable deletion of `name` on `node`. Deleting an absent property
  /// records nothing.
  pub fn delete_property(&mut self, target: &mut T, node: NodeId, name: &str) {
    if target.property(node, name).is_none() {
      return;
    }
    self.save_property(target, node, name);
    target.delete_property(node, name);
  }

  fn save_property(&mut self, target: &T, node: NodeId, name: &str) {
    match target.property(node, name) {
      Some(prior) => self.add_action(OP_SET_PROPERTY, smallvec![
        Value::Node(node),
        Value::Str(name.into()),
        prior
      ]),
      None => {
        self.add_action(OP_DELETE_PROPERTY, smallvec![
          Value::Node(node),
          Value::Str(name.into())
        ])
      },
    }
  }
}

impl<T: PropertyTarget> Default for ActionLog<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for ActionLog<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActionLog")
      .field("undo_stack", &self.undo_stack)
      .field("redo_stack", &self.redo_stack)
      .field("replay", &self.replay)
      .field("disabled", &self.disabled)
      .field("ops", &self.ops)
      .finish_non_exhaustive()
  }
}

fn node_arg(op: OpId, args: &[Value], index: usize) -> Result<NodeId> {
  args
    .get(index)
    .and_then(Value::as_node)
    .ok_or(HistoryError::BadArgument { op, index })
}

fn str_arg<'a>(op: OpId, args: &'a [Value], index: usize) -> Result<&'a str> {
  args
    .get(index)
    .and_then(Value::as_str)
    .ok_or(HistoryError::BadArgument { op, index })
}

fn op_set_property<T: PropertyTarget>(
  target: &mut T,
  log: &mut ActionLog<T>,
  args: &[Value],
) -> Result<()> {
  let node = node_arg(OP_SET_PROPERTY, args, 0)?;
  let name = str_arg(OP_SET_PROPERTY, args, 1)?;
  let value = args
    .get(2)
    .cloned()
    .ok_or(HistoryError::BadArgument { op: OP_SET_PROPERTY, index: 2 })?;
  log.set_property(target, node, name, value);
  Ok(())
}

fn op_delete_property<T: PropertyTarget>(
  target: &mut T,
  log: &mut ActionLog<T>,
  args: &[Value],
) -> Result<()> {
  let node = node_arg(OP_DELETE_PROPERTY, args, 0)?;
  let name = str_arg(OP_DELETE_PROPERTY, args, 1)?;
  log.delete_property(target, node, name);
  Ok(())
}

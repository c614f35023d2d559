use crate::{
  history::ActionLog,
  postpone::DeferredQueue,
  tree::{
    IdentityTable,
    PropertyTarget,
  },
};

/// Per-document editing state: the action log, the deferred-action queue,
/// and the identity table, owned together so two open documents can never
/// bleed history or identities into each other.
#[derive(Debug)]
pub struct Session<T> {
  pub history:    ActionLog<T>,
  pub deferred:   DeferredQueue<T>,
  pub identities: IdentityTable,
}

impl<T: PropertyTarget> Session<T> {
  /// A session whose log already knows the built-in property operations.
  pub fn new() -> Self {
    Self {
      history:    ActionLog::new(),
      deferred:   DeferredQueue::new(),
      identities: IdentityTable::new(),
    }
  }
}

impl<T> Session<T> {
  /// Resets the session for a freshly loaded document.
  ///
  /// History and pending deferred work are dropped; registered operations
  /// survive, and the identity counter keeps running so identities from
  /// the previous document are never reissued.
  pub fn reset(&mut self) {
    self.history.clear();
    self.deferred.clear();
    self.identities.clear();
  }
}

impl<T: PropertyTarget> Default for Session<T> {
  fn default() -> Self {
    Self::new()
  }
}

use std::{
  fmt,
  mem,
};

use thiserror::Error;

use crate::history::{
  self,
  ActionLog,
};

/// Number of drain waves after which a scheduling cycle is assumed.
const MAX_WAVES: usize = 10;

/// Result type for deferred-queue operations.
pub type Result<T> = std::result::Result<T, DeferError>;

#[derive(Debug, Error)]
pub enum DeferError {
  #[error("deferred actions still pending after 10 waves; scheduling cycle suspected")]
  TooManyWaves,
  #[error(transparent)]
  History(#[from] history::HistoryError),
}

/// A deferred callback.
///
/// Receives the mutation target, the action log, and the queue itself so
/// follow-up work can be scheduled into the next wave.
pub type DeferredFn<T> =
  Box<dyn FnOnce(&mut T, &mut ActionLog<T>, &mut DeferredQueue<T>) -> history::Result<()>>;

struct Deferred<T> {
  run:           DeferredFn<T>,
  /// Suppression state captured when the action was scheduled, not when it
  /// runs.
  undo_disabled: bool,
}

/// Queue of cascading fixups that must run after the triggering edit has
/// finished recording its own atomic group.
///
/// Mutations schedule work here instead of running it inline so that the
/// cascade's side effects cannot be misattributed to the triggering undo
/// group; the host event loop drains the queue once control returns to the
/// outer entry point.
pub struct DeferredQueue<T> {
  pending: Vec<Deferred<T>>,
}

impl<T> DeferredQueue<T> {
  pub fn new() -> Self {
    Self {
      pending: Vec::new(),
    }
  }

  /// Schedules `action` for the next drain, capturing the log's current
  /// suppression state immediately.
  pub fn add<F>(&mut self, log: &ActionLog<T>, action: F)
  where
    F: FnOnce(&mut T, &mut ActionLog<T>, &mut DeferredQueue<T>) -> history::Result<()> + 'static,
  {
    self.pending.push(Deferred {
      run:           Box::new(action),
      undo_disabled: log.is_disabled(),
    });
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.pending.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  /// Drops all pending actions without running them.
  pub fn clear(&mut self) {
    self.pending.clear();
  }

  /// Drains the queue in waves.
  ///
  /// Each wave snapshots the queue, clears it, and runs every captured
  /// action in FIFO order, through
  /// [`disable_while_executing`](ActionLog::disable_while_executing) when
  /// the action was scheduled under suppression. Actions enqueued during a
  /// wave run in the following wave.
  ///
  /// # Errors
  /// Returns [`DeferError::TooManyWaves`] once ten waves have run and work
  /// is still pending; that signals an upstream scheduling cycle and is
  /// never silently truncated. Action failures propagate immediately,
  /// leaving the remainder of the queue untouched.
  pub fn perform(&mut self, target: &mut T, log: &mut ActionLog<T>) -> Result<()> {
    let mut waves = 0;
    while !self.pending.is_empty() {
      if waves == MAX_WAVES {
        return Err(DeferError::TooManyWaves);
      }
      let wave = mem::take(&mut self.pending);
      tracing::trace!("deferred wave {waves}: {} actions", wave.len());
      for action in wave {
        if action.undo_disabled {
          log.disable_while_executing(|log| (action.run)(target, log, self))?;
        } else {
          (action.run)(target, log, self)?;
        }
      }
      waves += 1;
    }
    Ok(())
  }
}

impl<T> Default for DeferredQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for DeferredQueue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DeferredQueue")
      .field("pending", &self.pending.len())
      .finish()
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::command::OpTable;

  type Target = Vec<&'static str>;

  fn setup() -> (Target, ActionLog<Target>, DeferredQueue<Target>) {
    (Vec::new(), ActionLog::with_ops(OpTable::new()), DeferredQueue::new())
  }

  #[test]
  fn actions_run_in_fifo_order() {
    let (mut target, mut log, mut queue) = setup();

    queue.add(&log, |t: &mut Target, _, _| {
      t.push("a1");
      Ok(())
    });
    queue.add(&log, |t: &mut Target, _, _| {
      t.push("a2");
      Ok(())
    });

    queue.perform(&mut target, &mut log).unwrap();
    assert_eq!(target, vec!["a1", "a2"]);
    assert!(queue.is_empty());
  }

  #[test]
  fn action_scheduled_during_a_wave_runs_in_the_next() {
    let (mut target, mut log, mut queue) = setup();

    queue.add(&log, |t: &mut Target, log: &mut ActionLog<Target>, q: &mut DeferredQueue<Target>| {
      t.push("first");
      q.add(log, |t: &mut Target, _, _| {
        t.push("follow-up");
        Ok(())
      });
      Ok(())
    });
    queue.add(&log, |t: &mut Target, _, _| {
      t.push("second");
      Ok(())
    });

    queue.perform(&mut target, &mut log).unwrap();
    // The follow-up lands after everything from the first wave.
    assert_eq!(target, vec!["first", "second", "follow-up"]);
  }

  #[test]
  fn scheduling_cycle_is_fatal() {
    let (mut target, mut log, mut queue) = setup();

    fn reschedule(
      _: &mut Target,
      log: &mut ActionLog<Target>,
      queue: &mut DeferredQueue<Target>,
    ) -> history::Result<()> {
      queue.add(log, reschedule);
      Ok(())
    }

    queue.add(&log, reschedule);
    let err = queue.perform(&mut target, &mut log).unwrap_err();
    assert!(matches!(err, DeferError::TooManyWaves));
  }

  #[test]
  fn suppression_is_captured_at_schedule_time() {
    let (mut target, mut log, mut queue) = setup();

    log
      .disable_while_executing(|log| {
        queue.add(log, |t: &mut Target, log: &mut ActionLog<Target>, _: &mut DeferredQueue<Target>| {
          t.push(if log.is_disabled() { "suppressed" } else { "recording" });
          Ok(())
        });
        Ok(())
      })
      .unwrap();
    assert!(!log.is_disabled());

    queue.add(&log, |t: &mut Target, log: &mut ActionLog<Target>, _: &mut DeferredQueue<Target>| {
      t.push(if log.is_disabled() { "suppressed" } else { "recording" });
      Ok(())
    });

    queue.perform(&mut target, &mut log).unwrap();
    assert_eq!(target, vec!["suppressed", "recording"]);
  }

  #[test]
  fn failure_propagates_immediately() {
    let (mut target, mut log, mut queue) = setup();

    queue.add(&log, |_: &mut Target, _, _| {
      Err(history::HistoryError::NestedReplay)
    });
    queue.add(&log, |t: &mut Target, _, _| {
      t.push("never");
      Ok(())
    });

    let err = queue.perform(&mut target, &mut log).unwrap_err();
    assert!(matches!(err, DeferError::History(_)));
    assert!(target.is_empty());
  }
}

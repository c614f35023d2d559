use std::time::Instant;

/// One segment of a computed edit path.
///
/// The half-open spans `src[src_start..src_end]` and
/// `dest[dest_start..dest_end]` are a matched run; the edits sit implicitly
/// between consecutive segments: `src` elements skipped over are
/// deletions, `dest` elements skipped over are insertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSegment {
  pub src_start:  usize,
  pub dest_start: usize,
  pub src_end:    usize,
  pub dest_end:   usize,
}

impl DiffSegment {
  /// True when the segment carries a matched run of nonzero length.
  #[inline]
  fn is_nonempty(&self) -> bool {
    self.src_start != self.src_end || self.dest_start != self.dest_end
  }
}

/// A single operation of the derived edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
  /// Delete `src[src_start..src_end]`; `dest` is the destination offset at
  /// that point.
  Delete {
    src_start: usize,
    src_end:   usize,
    dest:      usize,
  },
  /// Insert `dest[dest_start..dest_end]`; `src` is the source offset at
  /// that point.
  Insert {
    src:        usize,
    dest_start: usize,
    dest_end:   usize,
  },
}

/// Furthest point reached on one diagonal, with a back-pointer into the
/// trace arena for path reconstruction.
struct Trace {
  seg:  DiffSegment,
  prev: Option<usize>,
}

/// Computes a minimal edit path turning `src` into `dest`.
///
/// This is the O(N·D) furthest-reaching-point algorithm over the edit
/// graph, diagonals `k = col - row`: for each edit distance, every
/// reachable diagonal extends from its `k-1` predecessor (a deletion) or
/// its `k+1` predecessor (an insertion), then slides through any run of
/// equal elements. The first distance to reach the sink wins.
///
/// When both predecessors are viable, the insertion is taken exactly when
/// the deletion trace sits strictly behind it on the source axis, which
/// means insertion also wins ties on the resulting source coordinate. At
/// the left boundary of the explored band only insertion is considered, at
/// the right boundary only deletion. Consumers depend on the particular
/// script shape this rule produces, so it must not be normalized to a
/// different convention.
///
/// The returned segments are in chronological order; interior segments
/// with an empty matched run are dropped, the final segment (ending at
/// `(src.len(), dest.len())`) is always present.
pub fn diff<T: PartialEq>(src: &[T], dest: &[T]) -> Vec<DiffSegment> {
  let started = tracing::enabled!(tracing::Level::DEBUG).then(Instant::now);

  let segments = compute(src, dest);

  if let Some(started) = started {
    tracing::debug!(
      "diff of {}x{} elements took {}s",
      src.len(),
      dest.len(),
      Instant::now().duration_since(started).as_secs_f64()
    );
  }
  segments
}

/// Character-wise convenience wrapper for text reconciliation.
pub fn diff_chars(src: &str, dest: &str) -> Vec<DiffSegment> {
  let src: Vec<char> = src.chars().collect();
  let dest: Vec<char> = dest.chars().collect();
  diff(&src, &dest)
}

/// Translates segments into the explicit insert/delete operations between
/// them, in application order. Identical inputs yield an empty script.
pub fn edit_script(segments: &[DiffSegment]) -> Vec<Edit> {
  let mut script = Vec::new();
  let mut src_pos = 0;
  let mut dest_pos = 0;
  for seg in segments {
    if seg.src_start > src_pos {
      script.push(Edit::Delete {
        src_start: src_pos,
        src_end:   seg.src_start,
        dest:      dest_pos,
      });
    }
    if seg.dest_start > dest_pos {
      script.push(Edit::Insert {
        src:        seg.src_start,
        dest_start: dest_pos,
        dest_end:   seg.dest_start,
      });
    }
    src_pos = seg.src_end;
    dest_pos = seg.dest_end;
  }
  script
}

fn compute<T: PartialEq>(src: &[T], dest: &[T]) -> Vec<DiffSegment> {
  let n = src.len();
  let m = dest.len();
  let max = n + m;
  // Diagonal k maps to index offset + k; k-1 and k+1 stay in bounds for
  // every k in [-max, max].
  let offset = (max + 1) as isize;

  let mut arena = vec![Trace {
    seg:  DiffSegment {
      src_start:  0,
      dest_start: 0,
      src_end:    0,
      dest_end:   0,
    },
    prev: None,
  }];
  let mut diagonals: Vec<Option<usize>> = vec![None; 2 * max + 3];
  diagonals[(offset + 1) as usize] = Some(0);

  for distance in 0..=(max as isize) {
    let mut k = -distance;
    while k <= distance {
      let del = diagonals[(offset + k - 1) as usize];
      let ins = diagonals[(offset + k + 1) as usize];

      let step = match (del, ins) {
        // Left boundary: only a down move (insertion) can reach here.
        (_, Some(ins)) if k == -distance => Some((ins, arena[ins].seg.src_end)),
        (Some(del), Some(ins))
          if k != distance && arena[del].seg.src_end < arena[ins].seg.src_end =>
        {
          Some((ins, arena[ins].seg.src_end))
        },
        // Right move: a deletion consumes one source element.
        (Some(del), _) => Some((del, arena[del].seg.src_end + 1)),
        _ => None,
      };

      let Some((prev, src_end)) = step else {
        diagonals[(offset + k) as usize] = None;
        k += 2;
        continue;
      };

      let mut src_end = src_end;
      let mut dest_end = (src_end as isize - k) as usize;
      let src_start = src_end;
      let dest_start = dest_end;
      // Slide through the snake.
      while src_end < n && dest_end < m && src[src_end] == dest[dest_end] {
        src_end += 1;
        dest_end += 1;
      }

      let slot = (offset + k) as usize;
      if src_end > n || dest_end > m {
        diagonals[slot] = None;
      } else {
        arena.push(Trace {
          seg: DiffSegment {
            src_start,
            dest_start,
            src_end,
            dest_end,
          },
          prev: Some(prev),
        });
        diagonals[slot] = Some(arena.len() - 1);
        if src_end == n && dest_end == m {
          return collect(&arena, arena.len() - 1);
        }
      }
      k += 2;
    }
  }
  unreachable!("the sink is reachable within src.len() + dest.len() edits")
}

fn collect(arena: &[Trace], last: usize) -> Vec<DiffSegment> {
  let mut segments = vec![arena[last].seg];
  let mut prev = arena[last].prev;
  while let Some(index) = prev {
    let trace = &arena[index];
    if trace.seg.is_nonempty() {
      segments.push(trace.seg);
    }
    prev = trace.prev;
  }
  segments.reverse();
  segments
}

//! Synchronized arc buffer between the acoustic search and lattice generation.
//!
//! The upstream acoustic decoder produces word-transition hypotheses (arcs)
//! frame by frame; lattice generation consumes them frame-synchronously on
//! its own thread. The buffer is the single shared structure between the two:
//! a frame-ordered arc queue with utterance lifecycle signaling.
//!
//! The consumer's only blocking points are [`ArcBuffer::start_utt`] and
//! [`ArcBuffer::wait`]. Draining happens under a short critical section per
//! frame index, released before the next frame is attempted, so the producer
//! is stalled as little as possible.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::constants::context::MAX_RIGHT_CONTEXTS;
use crate::constants::score::WORST;
use crate::error::{LatticeError, Result};
use crate::types::{Frame, RcId, Score, WordId};

/// A word-transition hypothesis reported by the acoustic search.
///
/// `dest` is the inclusive final frame of the word; the lattice node the arc
/// leads to lives at `dest + 1` on the lattice's exclusive frame axis.
#[derive(Debug, Clone)]
pub struct WordArc {
    /// Frame the word transition leaves from.
    pub src: Frame,

    /// Inclusive frame the word transition ends on.
    pub dest: Frame,

    /// Surface word id (pronunciation variant) of the hypothesis.
    pub word: WordId,

    /// Best absolute path score over all right contexts.
    pub score: Score,

    /// Presence bitset over right-context buckets.
    rc_bits: u64,

    /// Per-bucket absolute path scores, for the buckets present.
    rc_scores: Vec<(RcId, Score)>,
}

impl WordArc {
    /// Create an arc with no per-context score split.
    pub fn new(src: Frame, dest: Frame, word: WordId, score: Score) -> Self {
        Self {
            src,
            dest,
            word,
            score,
            rc_bits: 0,
            rc_scores: Vec::new(),
        }
    }

    /// Attach per-right-context scores, marking those buckets present.
    ///
    /// # Panics
    /// Panics if a bucket id is the wildcard sentinel or exceeds the bitset
    /// width.
    pub fn with_right_contexts(mut self, scores: &[(RcId, Score)]) -> Self {
        for &(rc, score) in scores {
            assert!(!rc.matches_any(), "wildcard bucket cannot carry a score");
            assert!((rc.value() as usize) < MAX_RIGHT_CONTEXTS);
            self.rc_bits |= 1u64 << rc.value();
            self.rc_scores.push((rc, score));
        }
        self
    }

    /// Check whether a right-context bucket is flagged present.
    pub fn has_right_context(&self, rc: RcId) -> bool {
        !rc.matches_any() && self.rc_bits & (1u64 << rc.value()) != 0
    }

    /// The absolute path score recorded for a present bucket.
    ///
    /// Absent buckets score worst.
    pub fn rc_score(&self, rc: RcId) -> Score {
        self.rc_scores
            .iter()
            .find(|(id, _)| *id == rc)
            .map(|&(_, score)| score)
            .unwrap_or(WORST)
    }

    /// The present right-context buckets with their scores, in bucket order
    /// of insertion.
    pub fn right_context_scores(&self) -> &[(RcId, Score)] {
        &self.rc_scores
    }
}

/// Consumer-side outcome of a wait on the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// New committed frames are available for draining.
    DataReady,

    /// The producer signaled end of utterance.
    EndOfUtterance,
}

#[derive(Debug, Default)]
struct Inner {
    /// Committed arcs, in non-decreasing source-frame order.
    arcs: Vec<WordArc>,

    /// Frames `< committed` are complete and visible to the consumer.
    committed: Frame,

    /// High-water mark of `committed` the consumer has been woken for.
    consumer_seen: Frame,

    utt_active: bool,
    eou: bool,

    /// Count of consumer end-of-utterance acknowledgments.
    utts_acked: u64,
}

/// Single-producer / single-consumer frame-synchronous arc queue.
///
/// The producer commits whole frames in order; the consumer drains them
/// under a short lock per frame index. One utterance is in flight at a time:
/// the producer's next `producer_start_utt` blocks until the consumer has
/// acknowledged the previous utterance with [`ArcBuffer::end_utt`].
#[derive(Debug)]
pub struct ArcBuffer {
    state: Mutex<Inner>,
    /// Wakes the producer (slot release on consumer ack).
    producer_cv: Condvar,
    /// Wakes the consumer (utterance start, committed frames, EOU).
    consumer_cv: Condvar,
    max_n_rc: usize,
}

impl ArcBuffer {
    /// Create a buffer distinguishing `max_n_rc` right-context buckets.
    pub fn new(max_n_rc: usize) -> Self {
        assert!(max_n_rc <= MAX_RIGHT_CONTEXTS);
        Self {
            state: Mutex::new(Inner::default()),
            producer_cv: Condvar::new(),
            consumer_cv: Condvar::new(),
            max_n_rc,
        }
    }

    /// Number of right-context buckets this buffer distinguishes.
    pub fn max_n_rc(&self) -> usize {
        self.max_n_rc
    }

    // ------------------------------------------------------------------
    // Consumer API
    // ------------------------------------------------------------------

    /// Block until the producer starts an utterance.
    ///
    /// `None` blocks indefinitely. A bounded wait that expires yields a
    /// [`LatticeError::SetupFailure`]: the utterance is aborted and no
    /// partial lattice is published.
    pub fn start_utt(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.state.lock();
        while !inner.utt_active {
            match deadline {
                Some(deadline) => {
                    if self.consumer_cv.wait_until(&mut inner, deadline).timed_out()
                        && !inner.utt_active
                    {
                        return Err(LatticeError::SetupFailure(
                            "arc buffer never reached start of utterance".to_string(),
                        ));
                    }
                }
                None => self.consumer_cv.wait(&mut inner),
            }
        }
        Ok(())
    }

    /// Block until more committed frames are available or the producer
    /// signals end of utterance. `None` blocks indefinitely.
    ///
    /// This is the consumer's sole mid-utterance suspension point.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.state.lock();
        loop {
            if inner.committed > inner.consumer_seen {
                inner.consumer_seen = inner.committed;
                return Ok(WaitOutcome::DataReady);
            }
            if inner.eou {
                return Ok(WaitOutcome::EndOfUtterance);
            }
            match deadline {
                Some(deadline) => {
                    if self.consumer_cv.wait_until(&mut inner, deadline).timed_out()
                        && inner.committed <= inner.consumer_seen
                        && !inner.eou
                    {
                        return Err(LatticeError::Timeout(
                            "timed out waiting for arc data".to_string(),
                        ));
                    }
                }
                None => self.consumer_cv.wait(&mut inner),
            }
        }
    }

    /// Enter the buffer's critical section.
    ///
    /// The returned guard is the scoped lock around draining one frame
    /// index; dropping it releases the producer on every exit path.
    pub fn lock(&self) -> ArcBufferGuard<'_> {
        ArcBufferGuard {
            inner: self.state.lock(),
        }
    }

    /// Check whether the producer has signaled end of utterance.
    pub fn end_of_utterance(&self) -> bool {
        self.state.lock().eou
    }

    /// Acknowledge consumption of the utterance, releasing producer slots.
    ///
    /// Clears all per-utterance buffer state; the producer's next
    /// `producer_start_utt` may proceed after this.
    pub fn end_utt(&self) {
        let mut inner = self.state.lock();
        inner.arcs.clear();
        inner.committed = 0;
        inner.consumer_seen = 0;
        inner.utt_active = false;
        inner.eou = false;
        inner.utts_acked += 1;
        debug!("utterance {} acknowledged", inner.utts_acked);
        self.producer_cv.notify_all();
    }

    /// Count of utterances the consumer has acknowledged.
    pub fn utterances_acked(&self) -> u64 {
        self.state.lock().utts_acked
    }

    // ------------------------------------------------------------------
    // Producer API
    // ------------------------------------------------------------------

    /// Start a new utterance, blocking until the previous one is acked.
    pub fn producer_start_utt(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.state.lock();
        while inner.utt_active || inner.eou {
            match deadline {
                Some(deadline) => {
                    if self.producer_cv.wait_until(&mut inner, deadline).timed_out()
                        && (inner.utt_active || inner.eou)
                    {
                        return Err(LatticeError::Timeout(
                            "timed out waiting for utterance slot".to_string(),
                        ));
                    }
                }
                None => self.producer_cv.wait(&mut inner),
            }
        }
        inner.utt_active = true;
        self.consumer_cv.notify_all();
        Ok(())
    }

    /// Commit one frame's worth of arcs, making it visible to the consumer.
    ///
    /// Frames must be committed in order; all arcs must leave the committed
    /// frame.
    pub fn commit_frame(&self, frame: Frame, arcs: Vec<WordArc>) {
        let mut inner = self.state.lock();
        debug_assert!(inner.utt_active);
        debug_assert_eq!(frame, inner.committed, "frames must be committed in order");
        debug_assert!(arcs.iter().all(|a| a.src == frame && a.dest >= a.src));
        inner.arcs.extend(arcs);
        inner.committed = frame + 1;
        self.consumer_cv.notify_all();
    }

    /// Signal end of utterance; no further frames may be committed until
    /// the consumer acks and the next utterance starts.
    pub fn producer_end_utt(&self) {
        let mut inner = self.state.lock();
        inner.eou = true;
        self.consumer_cv.notify_all();
    }
}

/// Guard over the buffer's critical section.
pub struct ArcBufferGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl ArcBufferGuard<'_> {
    /// Committed arcs starting at the first with source frame ≥ `frame`, or
    /// `None` when no such arc has been committed yet.
    ///
    /// Arcs are in non-decreasing source-frame order; callers draining one
    /// frame index stop at the first arc with a later source frame.
    pub fn arcs_from(&self, frame: Frame) -> Option<&[WordArc]> {
        let arcs = &self.inner.arcs;
        let start = arcs.partition_point(|a| a.src < frame);
        if start == arcs.len() {
            None
        } else {
            Some(&arcs[start..])
        }
    }
}

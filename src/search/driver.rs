//! Frame-synchronous decode driver over the arc buffer.
//!
//! The driver runs the utterance lifecycle as a small state machine:
//! INITIAL (reset, wait for start of utterance) → AWAITING_DATA (the sole
//! suspension point) → EXPANDING (drain whole frames under short critical
//! sections) → UTTERANCE_END (acknowledge, hand off the lattice) → INITIAL.

use std::sync::Arc;

use tracing::{debug, info};

use crate::buffer::{ArcBuffer, WaitOutcome, WordArc};
use crate::config::LatgenConfig;
use crate::error::Result;
use crate::lattice::{LatticeStore, LinkMetadata};
use crate::model::{Dictionary, LanguageModel};
use crate::search::builder::{expand_frame, ExpansionWorkspace};
use crate::types::{Frame, LmStateId};

/// A finished utterance: the lattice plus decode statistics.
#[derive(Debug)]
pub struct DecodedUtterance {
    /// The word lattice, ownership transferred to the caller.
    pub lattice: LatticeStore,

    /// Number of frames drained from the arc buffer.
    pub n_frames: Frame,

    /// Number of links created, detached ones included.
    pub n_links: usize,
}

/// Incremental lattice-generation search pass.
///
/// Consumes one utterance of arcs from the buffer per
/// [`decode_utterance`](Self::decode_utterance) call. The lattice is built
/// fresh per utterance; the metadata arrays and expansion scratch are reset
/// and reused across utterances without reallocation.
pub struct LatticeDecoder {
    buffer: Arc<ArcBuffer>,
    dict: Arc<dyn Dictionary>,
    lm: Arc<dyn LanguageModel>,
    config: LatgenConfig,
    meta: LinkMetadata,
    workspace: ExpansionWorkspace,
    frame_arcs: Vec<WordArc>,
}

impl LatticeDecoder {
    /// Create a decoder consuming `buffer` against the given models.
    pub fn new(
        buffer: Arc<ArcBuffer>,
        dict: Arc<dyn Dictionary>,
        lm: Arc<dyn LanguageModel>,
        config: LatgenConfig,
    ) -> Self {
        Self {
            buffer,
            dict,
            lm,
            config,
            meta: LinkMetadata::new(),
            workspace: ExpansionWorkspace::new(),
            frame_arcs: Vec::new(),
        }
    }

    /// Decode one utterance into a word lattice.
    ///
    /// Blocks until the producer starts an utterance (subject to the
    /// configured setup timeout), drains arcs frame-synchronously until end
    /// of utterance, acknowledges consumption exactly once, and hands the
    /// finished lattice off. On any error no partial lattice is published
    /// and no acknowledgment is sent; the enclosing session may retry the
    /// utterance.
    pub fn decode_utterance(&mut self) -> Result<DecodedUtterance> {
        let buffer = Arc::clone(&self.buffer);

        // INITIAL: fresh lattice with its epsilon start node, recycled
        // scratch, then block on the start-of-utterance signal.
        let mut store =
            LatticeStore::with_capacity(self.config.node_capacity, self.config.link_capacity);
        store.find_or_create_node(0, LmStateId::EPSILON);
        self.meta.reset();
        self.workspace.reset();

        info!("waiting for arc buffer start");
        buffer.start_utt(self.config.start_utt_timeout())?;

        let mut frame: Frame = 0;
        let mut n_links = 0usize;
        loop {
            // AWAITING_DATA: the sole suspension point.
            if buffer.wait(None)? == WaitOutcome::EndOfUtterance {
                debug!("end of utterance signaled");
            }

            // EXPANDING: drain every frame currently visible, one short
            // critical section per frame index.
            loop {
                let guard = buffer.lock();
                let Some(arcs) = guard.arcs_from(frame) else {
                    break;
                };
                self.frame_arcs.clear();
                self.frame_arcs
                    .extend(arcs.iter().take_while(|a| a.src == frame).cloned());
                let n = expand_frame(
                    &mut store,
                    &mut self.meta,
                    self.dict.as_ref(),
                    self.lm.as_ref(),
                    &mut self.workspace,
                    frame,
                    &self.frame_arcs,
                )?;
                n_links += n;
                info!("added {} links leaving frame {}", n, frame);
                frame += 1;
            }

            // UTTERANCE_END: acknowledge exactly once, releasing the
            // producer's slot, and transfer the lattice out.
            if buffer.end_of_utterance() {
                buffer.end_utt();
                info!("utterance finished: {} frames, {} links", frame, n_links);
                return Ok(DecodedUtterance {
                    lattice: store,
                    n_frames: frame,
                    n_links,
                });
            }
        }
    }
}

//! Per-arc lattice expansion: context matching, node and link creation,
//! dead-path pruning.
//!
//! For every node active at the frame being drained, each arc leaving that
//! frame is matched against the node's incoming links by right phonetic
//! context, expanded into links toward a find-or-create destination node,
//! and scored relative to the matched incoming link's absolute path score.
//! Incoming links that no arc's context continued are unlinked afterwards.

use tracing::trace;

use crate::buffer::WordArc;
use crate::error::{LatticeError, Result};
use crate::lattice::{LatticeStore, LinkMetadata};
use crate::model::{Dictionary, LanguageModel};
use crate::search::backoff::resolve_lmstate;
use crate::types::{Frame, LinkId, NodeId, RcId, WordId};

/// Per-entry activity bitset, sized to a node's incoming link count.
#[derive(Debug, Default)]
struct EntryBits {
    words: Vec<u64>,
    len: usize,
}

impl EntryBits {
    fn reset(&mut self, len: usize) {
        self.len = len;
        self.words.clear();
        self.words.resize((len + 63) / 64, 0);
    }

    fn set(&mut self, i: usize) {
        debug_assert!(i < self.len);
        self.words[i / 64] |= 1u64 << (i % 64);
    }

    fn is_set(&self, i: usize) -> bool {
        self.words[i / 64] >> (i % 64) & 1 != 0
    }
}

/// Reusable scratch state for frame expansion.
///
/// Owned by the decode driver and passed into [`expand_frame`] so that the
/// active-node list, the LM history buffer and the per-node bitsets are
/// allocated once per decoder rather than once per frame.
#[derive(Debug, Default)]
pub struct ExpansionWorkspace {
    active_nodes: Vec<NodeId>,
    history: Vec<WordId>,
    entry_bits: EntryBits,
    dead_links: Vec<LinkId>,
}

impl ExpansionWorkspace {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all scratch state, keeping allocations.
    pub fn reset(&mut self) {
        self.active_nodes.clear();
        self.history.clear();
        self.entry_bits.reset(0);
        self.dead_links.clear();
    }
}

/// Expand every arc leaving `frame` from every node active at `frame`.
///
/// `arcs` must contain exactly the arcs whose source frame equals `frame`.
/// Returns the number of links created. After all arcs are processed for a
/// node, its incoming entries that matched no arc's right context are
/// unlinked (dead-path pruning).
pub fn expand_frame(
    store: &mut LatticeStore,
    meta: &mut LinkMetadata,
    dict: &dyn Dictionary,
    lm: &dyn LanguageModel,
    ws: &mut ExpansionWorkspace,
    frame: Frame,
    arcs: &[WordArc],
) -> Result<usize> {
    // The active node set is rebuilt from the frame index every frame.
    ws.active_nodes.clear();
    ws.active_nodes.extend_from_slice(store.nodes_at_frame(frame));
    if ws.active_nodes.is_empty() || arcs.is_empty() {
        return Ok(0);
    }

    let mut n_links = 0;
    for ni in 0..ws.active_nodes.len() {
        let node = ws.active_nodes[ni];
        ws.entry_bits.reset(store.node(node).entries().len());

        for arc in arcs {
            debug_assert_eq!(arc.src, frame);
            n_links += expand_node_arc(
                store,
                meta,
                dict,
                lm,
                &mut ws.history,
                &mut ws.entry_bits,
                node,
                arc,
            )?;
        }

        // Entries never marked active have no right-context-consistent
        // continuation: unlink them.
        ws.dead_links.clear();
        for (i, &linkid) in store.node(node).entries().iter().enumerate() {
            if !ws.entry_bits.is_set(i) {
                ws.dead_links.push(linkid);
            }
        }
        for di in 0..ws.dead_links.len() {
            store.unlink(ws.dead_links[di]);
        }
    }
    Ok(n_links)
}

/// Expand one (node, arc) pair into zero or more links.
#[allow(clippy::too_many_arguments)]
fn expand_node_arc(
    store: &mut LatticeStore,
    meta: &mut LinkMetadata,
    dict: &dyn Dictionary,
    lm: &dyn LanguageModel,
    history: &mut Vec<WordId>,
    entry_bits: &mut EntryBits,
    node: NodeId,
    arc: &WordArc,
) -> Result<usize> {
    let ciphone = dict.first_phone(arc.word);
    let node_frame = store.node(node).frame;
    let node_lmstate = store.node(node).lmstate;

    // Find the incoming link the arc's leading phone continues: the first
    // entry recorded with the wildcard context, or whose bucket for this
    // leading phone equals its recorded right-context id.
    let mut matched: Option<(usize, LinkId)> = None;
    for (i, &linkid) in store.node(node).entries().iter().enumerate() {
        let rc = meta.rc(linkid);
        if rc.matches_any() {
            matched = Some((i, linkid));
            break;
        }
        let surface = meta.surface_word(linkid);
        let bucket = dict.right_context_bucket(
            dict.last_phone(surface),
            dict.second_last_phone(surface),
            ciphone,
        );
        if bucket == rc {
            matched = Some((i, linkid));
            break;
        }
    }

    let entry_score = match matched {
        Some((i, linkid)) => {
            entry_bits.set(i);
            meta.path_score(linkid)
        }
        None => {
            // Only the utterance-start node legally has no matchable entry.
            if node_frame != 0 {
                return Err(LatticeError::IntegrityViolation(format!(
                    "no incoming link at node {} (frame {}) matches the leading phone of word {}",
                    node, node_frame, arc.word
                )));
            }
            0
        }
    };

    // Raw successor history: the node's own state sequence, its head
    // rotated into first position, truncated to the model's history order.
    history.clear();
    if !node_lmstate.is_epsilon() {
        history.push(store.lmstate_head(node_lmstate));
        history.extend_from_slice(store.lmstate_history(node_lmstate));
        history.truncate(lm.order().saturating_sub(1));
    }
    let head = dict.base_word(arc.word);
    let resolution = resolve_lmstate(store, lm, head, history);
    let lscr = resolution.lscr + resolution.bowt;

    // Arc end frames are inclusive; the lattice frame axis is exclusive.
    let dest = store.find_or_create_node(arc.dest + 1, resolution.lmstate);
    trace!("expanding {} from {} toward {}", arc.word, node, dest);

    // One link per surviving right context; links store score deltas
    // against the matched entry, metadata keeps the absolute scores.
    let mut n_links = 0;
    if dict.pron_len(arc.word) == 1 {
        let id = store.create_link(node, dest, head, arc.score - entry_score);
        store.link_mut(id).lscr = lscr;
        meta.record(id, RcId::NONE, arc.word, arc.score);
        n_links += 1;
    } else {
        for &(rc, score) in arc.right_context_scores() {
            let id = store.create_link(node, dest, head, score - entry_score);
            store.link_mut(id).lscr = lscr;
            meta.record(id, rc, arc.word, score);
            n_links += 1;
        }
    }
    Ok(n_links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TableDictionary, TableLanguageModel};
    use crate::types::{LmStateId, PhoneId};

    const W_ONE: WordId = WordId(10);
    const W_TWO: WordId = WordId(20);
    const W_TRI: WordId = WordId(30);

    /// W_ONE and W_TRI are single-phone; W_TWO is three phones ending in
    /// (P3, P4).
    fn test_dict() -> TableDictionary {
        let mut dict = TableDictionary::new();
        dict.add_word(W_ONE, W_ONE, &[PhoneId(1)]);
        dict.add_word(W_TRI, W_TRI, &[PhoneId(5)]);
        dict.add_word(W_TWO, W_TWO, &[PhoneId(2), PhoneId(3), PhoneId(4)]);
        dict
    }

    fn start_store() -> LatticeStore {
        let mut store = LatticeStore::new();
        store.find_or_create_node(0, LmStateId::EPSILON);
        store
    }

    fn expand(
        store: &mut LatticeStore,
        meta: &mut LinkMetadata,
        dict: &TableDictionary,
        lm: &TableLanguageModel,
        ws: &mut ExpansionWorkspace,
        frame: Frame,
        arcs: &[WordArc],
    ) -> Result<usize> {
        expand_frame(store, meta, dict, lm, ws, frame, arcs)
    }

    #[test]
    fn test_single_phone_arc_from_start() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let dict = test_dict();
        let lm = TableLanguageModel::new(3);

        let arcs = [WordArc::new(0, 0, W_ONE, 10)];
        let n = expand(&mut store, &mut meta, &dict, &lm, &mut ws, 0, &arcs).unwrap();

        assert_eq!(n, 1);
        assert_eq!(store.n_nodes(), 2);
        let dest = store.node_at(LmStateId::EPSILON, 1).unwrap();
        let entries = store.node(dest).entries();
        assert_eq!(entries.len(), 1);
        let link = entries[0];
        assert_eq!(store.link(link).ascr, 10);
        assert_eq!(meta.rc(link), RcId::NONE);
        assert_eq!(meta.path_score(link), 10);
        assert_eq!(meta.surface_word(link), W_ONE);
    }

    #[test]
    fn test_multi_phone_arc_splits_by_right_context() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let dict = test_dict();
        let lm = TableLanguageModel::new(3);

        let arcs = [WordArc::new(0, 3, W_TWO, 9)
            .with_right_contexts(&[(RcId::new(0), 7), (RcId::new(2), 9)])];
        let n = expand(&mut store, &mut meta, &dict, &lm, &mut ws, 0, &arcs).unwrap();

        assert_eq!(n, 2);
        let dest = store.node_at(LmStateId::EPSILON, 4).unwrap();
        let entries = store.node(dest).entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(meta.rc(entries[0]), RcId::new(0));
        assert_eq!(store.link(entries[0]).ascr, 7);
        assert_eq!(meta.rc(entries[1]), RcId::new(2));
        assert_eq!(store.link(entries[1]).ascr, 9);
    }

    #[test]
    fn test_same_destination_identity_reuses_node() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let dict = test_dict();
        let lm = TableLanguageModel::new(3);

        // Two different words, same end frame, same resolved state: one node.
        let arcs = [
            WordArc::new(0, 2, W_ONE, 10),
            WordArc::new(0, 2, W_TRI, 12),
        ];
        expand(&mut store, &mut meta, &dict, &lm, &mut ws, 0, &arcs).unwrap();

        assert_eq!(store.n_nodes(), 2);
        let dest = store.node_at(LmStateId::EPSILON, 3).unwrap();
        assert_eq!(store.node(dest).entries().len(), 2);
    }

    #[test]
    fn test_link_scores_telescope() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let dict = test_dict();
        let lm = TableLanguageModel::new(3);

        expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            0,
            &[WordArc::new(0, 0, W_ONE, 10)],
        )
        .unwrap();
        expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            1,
            &[WordArc::new(1, 1, W_ONE, 25)],
        )
        .unwrap();

        // The B -> C link stores exactly s_C - s_B.
        let c = store.node_at(LmStateId::EPSILON, 2).unwrap();
        let link = store.node(c).entries()[0];
        assert_eq!(store.link(link).ascr, 15);
        assert_eq!(meta.path_score(link), 25);
    }

    #[test]
    fn test_prunes_entries_without_context_continuation() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let mut dict = test_dict();
        let lm = TableLanguageModel::new(3);

        // W_ONE's leading phone falls in bucket 2 after W_TWO.
        dict.add_context_bucket(PhoneId(4), PhoneId(3), PhoneId(1), RcId::new(2));

        expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            0,
            &[WordArc::new(0, 3, W_TWO, 9)
                .with_right_contexts(&[(RcId::new(0), 7), (RcId::new(2), 9)])],
        )
        .unwrap();

        let mid = store.node_at(LmStateId::EPSILON, 4).unwrap();
        let (dead, live) = {
            let entries = store.node(mid).entries();
            (entries[0], entries[1])
        };
        assert_eq!(meta.rc(live), RcId::new(2));

        expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            4,
            &[WordArc::new(4, 5, W_ONE, 20)],
        )
        .unwrap();

        // Only the bucket-2 entry was continued; the bucket-0 entry is gone.
        assert_eq!(store.node(mid).entries(), &[live]);
        assert_eq!(store.node(store.start_node().unwrap()).exits(), &[live]);
        // The new link telescopes against the matched entry's score.
        let out = store.node(mid).exits()[0];
        assert_eq!(store.link(out).ascr, 20 - 9);
        assert_eq!(store.link(dead).word, W_TWO);
    }

    #[test]
    fn test_zero_matches_off_start_is_fatal() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let mut dict = test_dict();
        let lm = TableLanguageModel::new(3);

        // W_ONE's leading phone maps to bucket 2, but the only entry at the
        // mid node was recorded for bucket 0.
        dict.add_context_bucket(PhoneId(4), PhoneId(3), PhoneId(1), RcId::new(2));

        expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            0,
            &[WordArc::new(0, 3, W_TWO, 7).with_right_contexts(&[(RcId::new(0), 7)])],
        )
        .unwrap();

        let result = expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            4,
            &[WordArc::new(4, 5, W_ONE, 20)],
        );
        assert!(matches!(result, Err(LatticeError::IntegrityViolation(_))));
    }

    #[test]
    fn test_rotation_probes_node_state_sequence() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let dict = test_dict();
        let mut lm = TableLanguageModel::new(3);
        lm.add_ngram(W_ONE, &[WordId(2), WordId(3)], -450, 0);

        // A node whose LM state carries the sequence [2, 3].
        let state = store.find_or_create_lmstate(WordId(2), &[WordId(3)]);
        let mid = store.find_or_create_node(1, state);
        let start = store.start_node().unwrap();
        let inlink = store.create_link(start, mid, WordId(2), 5);
        meta.record(inlink, RcId::NONE, WordId(2), 5);

        expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            1,
            &[WordArc::new(1, 2, W_ONE, 30)],
        )
        .unwrap();

        // The trigram (W_ONE | 2, 3) matched: the destination state is the
        // interned sequence [2, 3] and the link carries its probability.
        let dest = store.node_at(state, 3).unwrap();
        let link = store.node(dest).entries()[0];
        assert_eq!(store.link(link).lscr, -450);
        assert_eq!(store.link(link).ascr, 30 - 5);
    }

    #[test]
    fn test_no_arcs_means_no_pruning() {
        let mut store = start_store();
        let mut meta = LinkMetadata::new();
        let mut ws = ExpansionWorkspace::new();
        let dict = test_dict();
        let lm = TableLanguageModel::new(3);

        expand(
            &mut store,
            &mut meta,
            &dict,
            &lm,
            &mut ws,
            0,
            &[WordArc::new(0, 0, W_ONE, 10)],
        )
        .unwrap();
        let mid = store.node_at(LmStateId::EPSILON, 1).unwrap();

        // Draining a frame that turns out to hold no arcs for this node's
        // frame must leave its entries untouched.
        let n = expand(&mut store, &mut meta, &dict, &lm, &mut ws, 1, &[]).unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.node(mid).entries().len(), 1);
    }
}

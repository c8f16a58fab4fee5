//! Arena storage for lattice nodes, links and language-model states.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{Frame, LinkId, LmStateId, NodeId, Score, WordId};

/// A lattice node, identified by (start frame, LM-state id).
///
/// At most one node exists per identity; creation goes through
/// [`LatticeStore::find_or_create_node`] only.
#[derive(Debug)]
pub struct LatticeNode {
    /// Start frame of the node on the exclusive lattice frame axis.
    pub frame: Frame,

    /// Language model state reached at this node.
    pub lmstate: LmStateId,

    /// Incoming links, in creation order.
    entries: Vec<LinkId>,

    /// Outgoing links, in creation order.
    exits: Vec<LinkId>,
}

impl LatticeNode {
    /// Incoming link ids in creation order.
    pub fn entries(&self) -> &[LinkId] {
        &self.entries
    }

    /// Outgoing link ids in creation order.
    pub fn exits(&self) -> &[LinkId] {
        &self.exits
    }
}

/// A directed, scored, word-labeled lattice edge.
#[derive(Debug)]
pub struct LatticeLink {
    /// Source node.
    pub src: NodeId,

    /// Destination node.
    pub dest: NodeId,

    /// Base word id of the hypothesis.
    pub word: WordId,

    /// Incremental acoustic score: the destination's absolute path score
    /// minus the matched incoming link's absolute path score.
    pub ascr: Score,

    /// Language model score contribution, backoff weight folded in.
    pub lscr: Score,
}

#[derive(Debug)]
struct LmState {
    head: WordId,
    history: Vec<WordId>,
}

/// Arena store owning all nodes, links and LM states of one utterance.
///
/// Link ids are dense and monotonically increasing, so they double as
/// indices into the parallel [`crate::lattice::LinkMetadata`] arrays. The
/// store is exclusively owned by the consuming search thread for the
/// utterance's duration and needs no internal locking.
#[derive(Debug, Default)]
pub struct LatticeStore {
    nodes: Vec<LatticeNode>,
    links: Vec<LatticeLink>,
    node_index: HashMap<(Frame, LmStateId), NodeId>,
    frame_index: HashMap<Frame, Vec<NodeId>>,
    lmstates: Vec<LmState>,
    lmstate_index: HashMap<(WordId, Vec<WordId>), LmStateId>,
}

impl LatticeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with arena capacity reserved up front.
    pub fn with_capacity(nodes: usize, links: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            links: Vec::with_capacity(links),
            node_index: HashMap::with_capacity(nodes),
            frame_index: HashMap::new(),
            lmstates: Vec::new(),
            lmstate_index: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Find the node at (LM state, frame), if it exists.
    pub fn node_at(&self, lmstate: LmStateId, frame: Frame) -> Option<NodeId> {
        self.node_index.get(&(frame, lmstate)).copied()
    }

    /// Find the node at (LM state, frame), creating it on first reference.
    pub fn find_or_create_node(&mut self, frame: Frame, lmstate: LmStateId) -> NodeId {
        if let Some(id) = self.node_at(lmstate, frame) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(LatticeNode {
            frame,
            lmstate,
            entries: Vec::new(),
            exits: Vec::new(),
        });
        self.node_index.insert((frame, lmstate), id);
        self.frame_index.entry(frame).or_default().push(id);
        debug!("created node {} at frame {} lmstate {}", id, frame, lmstate);
        id
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> &LatticeNode {
        &self.nodes[id.index()]
    }

    /// Nodes starting at `frame`, in creation order.
    pub fn nodes_at_frame(&self, frame: Frame) -> &[NodeId] {
        self.frame_index.get(&frame).map_or(&[], Vec::as_slice)
    }

    /// The utterance-start node, once created.
    pub fn start_node(&self) -> Option<NodeId> {
        self.node_at(LmStateId::EPSILON, 0)
    }

    /// The latest frame any node starts at; the utterance-final nodes for a
    /// downstream consumer are [`Self::nodes_at_frame`] of this frame.
    pub fn last_frame(&self) -> Frame {
        self.frame_index.keys().copied().max().unwrap_or(0)
    }

    /// Number of nodes in the arena.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Create a link from `src` to `dest` with a fresh sequential id.
    pub fn create_link(&mut self, src: NodeId, dest: NodeId, word: WordId, ascr: Score) -> LinkId {
        let id = LinkId(self.links.len() as u32);
        self.links.push(LatticeLink {
            src,
            dest,
            word,
            ascr,
            lscr: 0,
        });
        self.nodes[src.index()].exits.push(id);
        self.nodes[dest.index()].entries.push(id);
        id
    }

    /// Get a link by id.
    pub fn link(&self, id: LinkId) -> &LatticeLink {
        &self.links[id.index()]
    }

    /// Get a link by id, mutably.
    pub fn link_mut(&mut self, id: LinkId) -> &mut LatticeLink {
        &mut self.links[id.index()]
    }

    /// Detach a link from both endpoints.
    ///
    /// The link record stays in the arena so ids remain dense and stable;
    /// it simply no longer appears in any entry or exit list.
    pub fn unlink(&mut self, id: LinkId) {
        let (src, dest) = {
            let link = &self.links[id.index()];
            (link.src, link.dest)
        };
        self.nodes[src.index()].exits.retain(|&l| l != id);
        self.nodes[dest.index()].entries.retain(|&l| l != id);
        debug!("unlinked {} ({} -> {})", id, src, dest);
    }

    /// Number of links ever issued, including detached ones.
    pub fn n_links(&self) -> usize {
        self.links.len()
    }

    // ------------------------------------------------------------------
    // Language model states
    // ------------------------------------------------------------------

    /// Head word of an LM state. Must not be called on epsilon.
    pub fn lmstate_head(&self, id: LmStateId) -> WordId {
        self.lmstates[id.index()].head
    }

    /// History words of an LM state, most recent first, head excluded.
    /// Must not be called on epsilon.
    pub fn lmstate_history(&self, id: LmStateId) -> &[WordId] {
        &self.lmstates[id.index()].history
    }

    /// Total word count of an LM state's sequence (head plus history).
    pub fn lmstate_len(&self, id: LmStateId) -> usize {
        if id.is_epsilon() {
            0
        } else {
            1 + self.lmstates[id.index()].history.len()
        }
    }

    /// Find or create the LM state for (head, history).
    ///
    /// This is the only way LM states come into existence: exactly one id
    /// per distinct key within an utterance.
    pub fn find_or_create_lmstate(&mut self, head: WordId, history: &[WordId]) -> LmStateId {
        if let Some(&id) = self.lmstate_index.get(&(head, history.to_vec())) {
            return id;
        }
        let id = LmStateId(self.lmstates.len() as u32);
        self.lmstates.push(LmState {
            head,
            history: history.to_vec(),
        });
        self.lmstate_index.insert((head, history.to_vec()), id);
        id
    }

    /// Number of distinct LM states interned so far.
    pub fn n_lmstates(&self) -> usize {
        self.lmstates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_find_or_create_dedups() {
        let mut store = LatticeStore::new();
        let state = store.find_or_create_lmstate(WordId(1), &[]);

        let a = store.find_or_create_node(3, state);
        let b = store.find_or_create_node(3, state);
        assert_eq!(a, b);
        assert_eq!(store.n_nodes(), 1);

        let c = store.find_or_create_node(4, state);
        assert_ne!(a, c);
        assert_eq!(store.nodes_at_frame(3), &[a]);
        assert_eq!(store.nodes_at_frame(4), &[c]);
        assert!(store.nodes_at_frame(5).is_empty());
        assert_eq!(store.last_frame(), 4);
    }

    #[test]
    fn test_lmstate_find_or_create_dedups() {
        let mut store = LatticeStore::new();
        let a = store.find_or_create_lmstate(WordId(1), &[WordId(2)]);
        let b = store.find_or_create_lmstate(WordId(1), &[WordId(2)]);
        let c = store.find_or_create_lmstate(WordId(1), &[WordId(3)]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.n_lmstates(), 2);
        assert_eq!(store.lmstate_head(a), WordId(1));
        assert_eq!(store.lmstate_history(a), &[WordId(2)]);
        assert_eq!(store.lmstate_len(a), 2);
        assert_eq!(store.lmstate_len(LmStateId::EPSILON), 0);
    }

    #[test]
    fn test_link_ids_are_dense_and_ordered() {
        let mut store = LatticeStore::new();
        let src = store.find_or_create_node(0, LmStateId::EPSILON);
        let state = store.find_or_create_lmstate(WordId(1), &[]);
        let dest = store.find_or_create_node(1, state);

        let l0 = store.create_link(src, dest, WordId(1), 10);
        let l1 = store.create_link(src, dest, WordId(2), 20);
        assert_eq!(l0, LinkId(0));
        assert_eq!(l1, LinkId(1));
        assert_eq!(store.node(dest).entries(), &[l0, l1]);
        assert_eq!(store.node(src).exits(), &[l0, l1]);
    }

    #[test]
    fn test_unlink_detaches_without_compacting() {
        let mut store = LatticeStore::new();
        let src = store.find_or_create_node(0, LmStateId::EPSILON);
        let state = store.find_or_create_lmstate(WordId(1), &[]);
        let dest = store.find_or_create_node(1, state);

        let l0 = store.create_link(src, dest, WordId(1), 10);
        let l1 = store.create_link(src, dest, WordId(2), 20);
        store.unlink(l0);

        assert_eq!(store.node(dest).entries(), &[l1]);
        assert_eq!(store.node(src).exits(), &[l1]);
        // The arena keeps the record: ids stay dense and stable.
        assert_eq!(store.n_links(), 2);
        assert_eq!(store.link(l0).word, WordId(1));
    }
}

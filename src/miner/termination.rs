//! Termination detection for one mining round.
//!
//! Two mechanisms run side by side. The fast path is a single atomic stop
//! flag plus a stop channel that is closed once; workers poll it. The slow
//! path is a fixed binary-heap tree of per-worker nodes: nodes go inactive
//! bottom-up as workers exit, and a token walk from the root confirms that
//! every node is quiescent once the round is over.
//!
//! Nodes live in an arena addressed by id. Parent links are plain indices,
//! the shape never changes after construction and is read without locks.
//! Each node's `active`/`color` pair sits behind its own mutex; at most one
//! node lock is held at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use log::{debug, warn};
use serde::Serialize;

/// Token color used by the confirmation walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

#[derive(Debug)]
struct NodeState {
    active: bool,
    color: Color,
}

impl NodeState {
    fn fresh() -> Self {
        Self {
            active: true,
            color: Color::Black,
        }
    }
}

#[derive(Debug)]
struct TreeNode {
    parent: Option<usize>,
    children: Vec<usize>,
    state: Mutex<NodeState>,
}

/// Point-in-time view of a node, for logging and the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub active: bool,
    pub color: Color,
}

/// Spanning tree over the workers of one round plus the global stop signal.
#[derive(Debug)]
pub struct TerminationTree {
    nodes: Vec<TreeNode>,
    stopped: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Mutex<Receiver<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Worker exit guards run during unwinding; a poisoned node is still usable.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TerminationTree {
    /// Build the tree for `n` workers: node `i > 0` hangs under `(i - 1) / 2`.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`; a round always has at least one worker.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "termination tree needs at least one node");

        let mut nodes: Vec<TreeNode> = (0..n)
            .map(|i| TreeNode {
                parent: (i > 0).then(|| (i - 1) / 2),
                children: Vec::with_capacity(2),
                state: Mutex::new(NodeState::fresh()),
            })
            .collect();
        for i in 1..n {
            nodes[(i - 1) / 2].children.push(i);
        }

        let (stop_tx, stop_rx) = bounded(0);
        Self {
            nodes,
            stopped: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx: Mutex::new(stop_rx),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: usize) -> Option<usize> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: usize) -> &[usize] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn is_active(&self, id: usize) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| lock(&n.state).active)
    }

    pub fn color(&self, id: usize) -> Option<Color> {
        self.nodes.get(id).map(|n| lock(&n.state).color)
    }

    pub fn active_count(&self) -> usize {
        (0..self.nodes.len()).filter(|&id| self.is_active(id)).count()
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(id, node)| {
                let state = lock(&node.state);
                NodeSnapshot {
                    id,
                    parent: node.parent,
                    children: node.children.clone(),
                    active: state.active,
                    color: state.color,
                }
            })
            .collect()
    }

    /// Start a new round: every node active and uncolored, stop flag cleared,
    /// fresh stop channel.
    pub fn reset(&self) {
        for node in &self.nodes {
            *lock(&node.state) = NodeState::fresh();
        }
        let (tx, rx) = bounded(0);
        *lock(&self.stop_rx) = rx;
        *lock(&self.stop_tx) = Some(tx);
        self.stopped.store(false, Ordering::SeqCst);
    }

    fn mark_inactive(&self, id: usize) {
        lock(&self.nodes[id].state).active = false;
    }

    /// Mark `id` inactive and propagate towards the root while every child
    /// of the next parent is inactive. Returns true once the root is inactive.
    pub fn terminate_node(&self, id: usize) -> bool {
        if id >= self.nodes.len() {
            warn!("terminate_node: unknown node {id} (tree has {})", self.len());
            return false;
        }

        self.mark_inactive(id);
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            let siblings_done = self.nodes[parent]
                .children
                .iter()
                .all(|&child| !self.is_active(child));
            if !siblings_done {
                return false;
            }
            self.mark_inactive(parent);
            debug!("node {current}: subtree of {parent} inactive, propagating");
            current = parent;
        }
        true
    }

    /// Raise the stop flag and close the stop channel. Only the first call in
    /// a round has any effect; returns whether this call was it.
    pub fn signal_global_stop(&self) -> bool {
        self.stopped.store(true, Ordering::SeqCst);
        // Dropping the only sender disconnects every receiver.
        let closed = lock(&self.stop_tx).take();
        if closed.is_some() {
            debug!("global stop signalled");
        }
        closed.is_some()
    }

    /// Fast path: one atomic load.
    pub fn is_terminated(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Receiver that disconnects once the stop is signalled. Never carries a
    /// message; block on `recv()` or poll with [`Self::stop_observed`].
    pub fn stop_signal(&self) -> Receiver<()> {
        lock(&self.stop_rx).clone()
    }

    pub fn stop_observed(signal: &Receiver<()>) -> bool {
        matches!(signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Token walk confirming global termination.
    ///
    /// Depth-first and post-order from the root, with an explicit stack. Any
    /// active node aborts the walk. A node turns white only if it is inactive
    /// and none of its children is black. Confirmed iff the root ends white.
    pub fn detect_termination(&self) -> bool {
        let mut stack: Vec<(usize, bool)> = vec![(0, false)];

        while let Some((id, children_done)) = stack.pop() {
            let node = &self.nodes[id];
            if !children_done {
                if self.is_active(id) {
                    debug!("token walk: node {id} still active");
                    return false;
                }
                stack.push((id, true));
                stack.extend(node.children.iter().rev().map(|&child| (child, false)));
                continue;
            }

            let any_black = node
                .children
                .iter()
                .any(|&child| self.color(child) == Some(Color::Black));
            let mut state = lock(&node.state);
            if state.active {
                return false;
            }
            state.color = if any_black { Color::Black } else { Color::White };
        }

        self.color(0) == Some(Color::White)
    }
}

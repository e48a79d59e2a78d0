//! Mining round orchestration.
//!
//! One OS thread per worker, each hashing its own copy of the candidate block
//! on a disjoint nonce sequence. The coordinator races a single-slot result
//! channel against a deadline, then raises the global stop, joins every
//! worker and audits the termination tree before returning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use log::{debug, info, warn};
use uuid::Uuid;

use super::error::{MiningError, TerminationInconsistency};
use super::pow::{CancelSignal, MineOutcome, NonceSchedule, mine};
use super::termination::{NodeSnapshot, TerminationTree};
use crate::blockchain::{Block, MAX_DIFFICULTY};
use crate::transaction::Transaction;

/// Upper bound for one round when the caller has no preference.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a finishing worker waits to hand its block over.
pub const RESULT_SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// One worker per execution unit.
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

/// Counters for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundStats {
    pub round_id: String,
    pub workers_requested: usize,
    pub workers_spawned: usize,
    /// Exit guards released; equals `workers_requested` once the round returns.
    pub workers_exited: usize,
    pub hashes: u64,
    pub elapsed: Duration,
    pub termination_confirmed: bool,
    pub inconsistency: Option<TerminationInconsistency>,
    /// Tree state after the drain; empty when the round never started.
    pub tree: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone)]
pub struct RoundReport {
    pub outcome: Result<Block, MiningError>,
    pub stats: RoundStats,
}

/// Releases a worker from the drain barrier however it leaves, panics included.
struct ExitGuard {
    node: usize,
    tree: Arc<TerminationTree>,
    exited: Arc<AtomicUsize>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.tree.terminate_node(self.node);
        self.exited.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stop flag on every nonce, stop channel on the slow interval.
struct TreeCancel {
    tree: Arc<TerminationTree>,
    stop: Receiver<()>,
}

impl CancelSignal for TreeCancel {
    fn is_cancelled(&self) -> bool {
        self.tree.is_terminated()
    }

    fn checkpoint(&self) -> bool {
        TerminationTree::stop_observed(&self.stop)
    }
}

struct Worker {
    id: usize,
    workers: usize,
    candidate: Block,
    tree: Arc<TerminationTree>,
    results: Sender<Block>,
    hashes: Arc<AtomicU64>,
    send_timeout: Duration,
    _exit: ExitGuard,
}

impl Worker {
    fn run(self) {
        let cancel = TreeCancel {
            tree: Arc::clone(&self.tree),
            stop: self.tree.stop_signal(),
        };
        let schedule = NonceSchedule::for_worker(self.id, self.workers);
        let outcome = mine(self.candidate, schedule, &cancel);
        self.hashes.fetch_add(outcome.hashes(), Ordering::Relaxed);

        match outcome {
            MineOutcome::Found { block, hashes } => {
                if self.tree.is_terminated() {
                    debug!("worker {}: late block (nonce={}) dropped", self.id, block.nonce);
                    return;
                }
                let nonce = block.nonce;
                match self.results.send_timeout(block, self.send_timeout) {
                    Ok(()) => {
                        info!(
                            "worker {}: block found nonce={} after {} hashes",
                            self.id, nonce, hashes
                        );
                        self.tree.signal_global_stop();
                    }
                    Err(_) => debug!("worker {}: result slot taken, block discarded", self.id),
                }
            }
            MineOutcome::Cancelled { hashes } => {
                debug!("worker {}: cancelled after {} hashes", self.id, hashes);
            }
        }
    }
}

/// Runs bounded mining rounds over a pool of worker threads.
#[derive(Debug, Clone)]
pub struct MiningCoordinator {
    send_timeout: Duration,
}

impl Default for MiningCoordinator {
    fn default() -> Self {
        Self {
            send_timeout: RESULT_SEND_TIMEOUT,
        }
    }
}

impl MiningCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mine a block on top of `tip` (index, hash of the latest block).
    /// Returns the first valid block, or why there is none.
    pub fn start_mining(
        &self,
        tip: (u64, String),
        transactions: Vec<Transaction>,
        difficulty: u32,
        worker_count: usize,
        timeout: Duration,
    ) -> Result<Block, MiningError> {
        self.mine_round(tip, transactions, difficulty, worker_count, timeout)
            .outcome
    }

    /// Like [`Self::start_mining`], with the round's counters.
    pub fn mine_round(
        &self,
        tip: (u64, String),
        transactions: Vec<Transaction>,
        difficulty: u32,
        worker_count: usize,
        timeout: Duration,
    ) -> RoundReport {
        let started = Instant::now();
        let round_id = Uuid::new_v4().to_string();
        let mut stats = RoundStats {
            round_id: round_id.clone(),
            workers_requested: worker_count,
            workers_spawned: 0,
            workers_exited: 0,
            hashes: 0,
            elapsed: Duration::ZERO,
            termination_confirmed: false,
            inconsistency: None,
            tree: Vec::new(),
        };

        if let Err(err) = validate(difficulty, worker_count) {
            warn!("round {round_id}: {err}");
            return RoundReport {
                outcome: Err(err),
                stats,
            };
        }

        let (index, previous_hash) = tip;
        let candidate = Block::new(index + 1, previous_hash, transactions, difficulty);
        info!(
            "round {round_id}: mining block #{} with {} workers, difficulty {}, timeout {:?}",
            candidate.index, worker_count, difficulty, timeout
        );

        let tree = Arc::new(TerminationTree::new(worker_count));
        let exited = Arc::new(AtomicUsize::new(0));
        let hashes = Arc::new(AtomicU64::new(0));
        let (result_tx, result_rx) = bounded::<Block>(1);

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let worker = Worker {
                id,
                workers: worker_count,
                candidate: candidate.clone(),
                tree: Arc::clone(&tree),
                results: result_tx.clone(),
                hashes: Arc::clone(&hashes),
                send_timeout: self.send_timeout,
                _exit: ExitGuard {
                    node: id,
                    tree: Arc::clone(&tree),
                    exited: Arc::clone(&exited),
                },
            };
            // On spawn failure the closure is dropped and its guard released.
            match thread::Builder::new()
                .name(format!("miner-{id}"))
                .spawn(move || worker.run())
            {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("round {round_id}: failed to spawn worker {id}: {e}"),
            }
        }
        drop(result_tx);
        stats.workers_spawned = handles.len();

        let deadline = after(timeout);
        let outcome = select! {
            recv(result_rx) -> msg => msg.map_err(|_| MiningError::AllWorkersFailed),
            recv(deadline) -> _ => Err(MiningError::TimedOut { elapsed: started.elapsed() }),
        };
        tree.signal_global_stop();

        for handle in handles {
            if handle.join().is_err() {
                warn!("round {round_id}: a worker panicked");
            }
        }

        let stop_flag = tree.is_terminated();
        let tree_confirmed = tree.detect_termination();
        if stop_flag != tree_confirmed {
            let inconsistency = TerminationInconsistency {
                stop_flag,
                tree_confirmed,
            };
            warn!("round {round_id}: {inconsistency}");
            stats.inconsistency = Some(inconsistency);
        }
        stats.tree = tree.snapshot();
        debug!("round {round_id}: tree after drain {:?}", stats.tree);

        let outcome = match outcome {
            Ok(block) if !block.is_valid() => {
                warn!("round {round_id}: rejecting block with invalid proof of work");
                Err(MiningError::AllWorkersFailed)
            }
            other => other,
        };

        stats.workers_exited = exited.load(Ordering::SeqCst);
        stats.hashes = hashes.load(Ordering::Relaxed);
        stats.elapsed = started.elapsed();
        stats.termination_confirmed = tree_confirmed;

        match &outcome {
            Ok(block) => info!(
                "round {round_id}: block #{} hash={} nonce={} ({} hashes, {:?})",
                block.index, block.hash, block.nonce, stats.hashes, stats.elapsed
            ),
            Err(err) => warn!("round {round_id}: {err} ({} hashes)", stats.hashes),
        }

        RoundReport { outcome, stats }
    }
}

fn validate(difficulty: u32, worker_count: usize) -> Result<(), MiningError> {
    if worker_count == 0 {
        return Err(MiningError::InvalidConfig(
            "worker count must be at least 1".into(),
        ));
    }
    if difficulty > MAX_DIFFICULTY {
        return Err(MiningError::InvalidConfig(format!(
            "difficulty {difficulty} exceeds {MAX_DIFFICULTY} hex digits"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tip() -> (u64, String) {
        (0, "ab".repeat(32))
    }

    fn txs() -> Vec<Transaction> {
        vec![
            Transaction::new("alice", "bob", 2.0),
            Transaction::reward("miner"),
        ]
    }

    #[test]
    fn finds_valid_block_and_drains_workers() {
        let coordinator = MiningCoordinator::new();
        let report = coordinator.mine_round(tip(), txs(), 3, 4, Duration::from_secs(30));

        let block = report.outcome.expect("difficulty 3 is reachable");
        assert!(block.is_valid());
        assert!(block.hash.starts_with("000"));
        assert_eq!(block.hash, block.compute_hash());
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, tip().1);
        assert_eq!(block.transactions.len(), 2);

        let stats = report.stats;
        assert_eq!(stats.workers_spawned, 4);
        assert_eq!(stats.workers_exited, 4);
        assert!(stats.termination_confirmed);
        assert!(stats.inconsistency.is_none());
        assert!(stats.hashes >= 1);
    }

    #[test]
    fn single_worker_round() {
        let block = MiningCoordinator::new()
            .start_mining(tip(), txs(), 2, 1, Duration::from_secs(30))
            .unwrap();
        assert!(block.is_valid());
    }

    #[test]
    fn unreachable_difficulty_times_out_and_drains() {
        let started = Instant::now();
        let report = MiningCoordinator::new().mine_round(
            tip(),
            txs(),
            MAX_DIFFICULTY,
            3,
            Duration::from_millis(100),
        );
        assert!(matches!(report.outcome, Err(MiningError::TimedOut { .. })));
        assert_eq!(report.stats.workers_exited, 3);
        assert!(report.stats.termination_confirmed);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_configuration() {
        let c = MiningCoordinator::new();
        assert!(matches!(
            c.start_mining(tip(), txs(), 2, 0, DEFAULT_TIMEOUT),
            Err(MiningError::InvalidConfig(_))
        ));
        assert!(matches!(
            c.start_mining(tip(), txs(), MAX_DIFFICULTY + 1, 2, DEFAULT_TIMEOUT),
            Err(MiningError::InvalidConfig(_))
        ));
    }

    #[test]
    fn repeated_rounds_do_not_leak_workers() {
        let c = MiningCoordinator::new();
        for _ in 0..5 {
            let report = c.mine_round(tip(), txs(), 1, 8, Duration::from_secs(30));
            assert!(report.outcome.is_ok());
            assert_eq!(report.stats.workers_exited, 8);
        }
    }

    fn guard(tree: &Arc<TerminationTree>, exited: &Arc<AtomicUsize>) -> ExitGuard {
        ExitGuard {
            node: 0,
            tree: Arc::clone(tree),
            exited: Arc::clone(exited),
        }
    }

    #[test]
    fn panicking_worker_still_releases_its_node() {
        let tree = Arc::new(TerminationTree::new(1));
        let exited = Arc::new(AtomicUsize::new(0));

        let exit = guard(&tree, &exited);
        let handle = thread::spawn(move || {
            let _exit = exit;
            panic!("worker crashed mid-round");
        });
        assert!(handle.join().is_err());

        assert!(!tree.is_active(0));
        assert_eq!(exited.load(Ordering::SeqCst), 1);
        assert!(tree.detect_termination());
    }

    #[test]
    fn worker_dropped_before_running_is_released() {
        let tree = Arc::new(TerminationTree::new(1));
        let exited = Arc::new(AtomicUsize::new(0));
        let (results, result_rx) = bounded::<Block>(1);

        let worker = Worker {
            id: 0,
            workers: 1,
            candidate: Block::new(1, tip().1, txs(), 1),
            tree: Arc::clone(&tree),
            results,
            hashes: Arc::new(AtomicU64::new(0)),
            send_timeout: RESULT_SEND_TIMEOUT,
            _exit: guard(&tree, &exited),
        };
        drop(worker);

        assert!(!tree.is_active(0));
        assert_eq!(exited.load(Ordering::SeqCst), 1);
        assert!(result_rx.recv().is_err());
    }

    #[test]
    fn report_carries_drained_tree() {
        let report =
            MiningCoordinator::new().mine_round(tip(), txs(), 1, 3, Duration::from_secs(30));
        let tree = report.stats.tree;
        assert_eq!(tree.len(), 3);
        assert!(tree.iter().all(|node| !node.active));
        assert_eq!(tree[0].children, vec![1, 2]);

        let rejected = MiningCoordinator::new().mine_round(tip(), txs(), 1, 0, DEFAULT_TIMEOUT);
        assert!(rejected.stats.tree.is_empty());
    }

    #[test]
    fn default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }
}

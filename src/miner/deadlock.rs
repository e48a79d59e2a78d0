use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};

pub type ProcessId = u64;
pub type ResourceId = u64;

/// Derived wait-for graph: process -> processes it is blocked behind.
pub type WaitForGraph = BTreeMap<ProcessId, Vec<ProcessId>>;

#[derive(Debug, Default)]
struct Tables {
    /// Which process holds which resources
    allocations: BTreeMap<ProcessId, BTreeSet<ResourceId>>,
    /// Which process is waiting for which resources
    wait_for: BTreeMap<ProcessId, BTreeSet<ResourceId>>,
}

impl Tables {
    fn graph(&self) -> WaitForGraph {
        let mut graph = WaitForGraph::new();
        for (&process, resources) in &self.wait_for {
            for resource in resources {
                for (&holder, held) in &self.allocations {
                    if holder != process && held.contains(resource) {
                        debug!(
                            "process {process} waits for process {holder} (holds resource {resource})"
                        );
                        // One edge per pair, however many resources they contend on.
                        let edges = graph.entry(process).or_default();
                        if !edges.contains(&holder) {
                            edges.push(holder);
                        }
                    }
                }
            }
        }
        graph
    }
}

/// Wait-for graph deadlock detector.
///
/// Callers record ownership and waits; [`detect_deadlocks`] reports every
/// cycle it finds and leaves resolution to the caller. One mutex serializes
/// mutation against detection.
///
/// [`detect_deadlocks`]: DeadlockDetector::detect_deadlocks
#[derive(Debug, Default)]
pub struct DeadlockDetector {
    tables: Mutex<Tables>,
}

impl DeadlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `process` holds `resource`.
    pub fn add_allocation(&self, process: ProcessId, resource: ResourceId) {
        self.tables()
            .allocations
            .entry(process)
            .or_default()
            .insert(resource);
    }

    /// Record that `process` is blocked waiting for `resource`.
    pub fn add_wait_for(&self, process: ProcessId, resource: ResourceId) {
        self.tables()
            .wait_for
            .entry(process)
            .or_default()
            .insert(resource);
    }

    /// Forget that `process` holds `resource`. Returns whether it did.
    pub fn release(&self, process: ProcessId, resource: ResourceId) -> bool {
        let mut tables = self.tables();
        remove_entry(&mut tables.allocations, process, resource)
    }

    /// Forget that `process` waits for `resource`. Returns whether it did.
    pub fn clear_wait(&self, process: ProcessId, resource: ResourceId) -> bool {
        let mut tables = self.tables();
        remove_entry(&mut tables.wait_for, process, resource)
    }

    /// Drop every allocation and wait recorded for `process`.
    pub fn remove_process(&self, process: ProcessId) {
        let mut tables = self.tables();
        tables.allocations.remove(&process);
        tables.wait_for.remove(&process);
    }

    pub fn wait_for_graph(&self) -> WaitForGraph {
        self.tables().graph()
    }

    /// Every cycle in the current wait-for graph, each closed by repeating
    /// its first process (`[1, 2, 1]`). Empty means no deadlock.
    ///
    /// Depth-first forest: starts are taken in ascending id order and a
    /// process explored once is never explored again from another start.
    pub fn detect_deadlocks(&self) -> Vec<Vec<ProcessId>> {
        let graph = self.tables().graph();
        find_cycles(&graph)
    }

    /// Run detection and log the outcome. Used by the periodic scanner.
    pub fn scan(&self) -> DeadlockReport {
        let report = DeadlockReport {
            cycles: self.detect_deadlocks(),
        };
        if report.is_clear() {
            info!("deadlock scan: no deadlocks detected");
        } else {
            warn!("deadlock scan: {report}");
        }
        report
    }
}

fn remove_entry(
    table: &mut BTreeMap<ProcessId, BTreeSet<ResourceId>>,
    process: ProcessId,
    resource: ResourceId,
) -> bool {
    let Some(resources) = table.get_mut(&process) else {
        return false;
    };
    let removed = resources.remove(&resource);
    if resources.is_empty() {
        table.remove(&process);
    }
    removed
}

fn find_cycles(graph: &WaitForGraph) -> Vec<Vec<ProcessId>> {
    let mut cycles = Vec::new();
    let mut visited = BTreeSet::new();

    for &start in graph.keys() {
        if !visited.insert(start) {
            continue;
        }

        // The stack doubles as the current path: (process, next neighbor index).
        let mut stack: Vec<(ProcessId, usize)> = vec![(start, 0)];
        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            frame.1 += 1;

            let Some(&neighbor) = graph.get(&node).and_then(|n| n.get(next)) else {
                stack.pop();
                continue;
            };

            if let Some(pos) = stack.iter().position(|&(p, _)| p == neighbor) {
                let mut cycle: Vec<ProcessId> = stack[pos..].iter().map(|&(p, _)| p).collect();
                cycle.push(neighbor);
                debug!("cycle detected: {}", format_cycle(&cycle));
                cycles.push(cycle);
            } else if visited.insert(neighbor) {
                stack.push((neighbor, 0));
            }
        }
    }

    cycles
}

/// Render a cycle as `1 → 2 → 1`.
pub fn format_cycle(cycle: &[ProcessId]) -> String {
    cycle
        .iter()
        .map(ProcessId::to_string)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockReport {
    pub cycles: Vec<Vec<ProcessId>>,
}

impl DeadlockReport {
    pub fn is_clear(&self) -> bool {
        self.cycles.is_empty()
    }
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cycles.is_empty() {
            return write!(f, "no deadlocks");
        }
        write!(f, "{} deadlock(s):", self.cycles.len())?;
        for (i, cycle) in self.cycles.iter().enumerate() {
            write!(f, " #{} [{}]", i + 1, format_cycle(cycle))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn two_process_deadlock() {
        let d = DeadlockDetector::new();
        d.add_allocation(1, 1);
        d.add_allocation(2, 2);
        d.add_wait_for(1, 2);
        d.add_wait_for(2, 1);

        let cycles = d.detect_deadlocks();
        assert_eq!(cycles, vec![vec![1, 2, 1]]);
    }

    #[test]
    fn no_overlap_no_deadlock() {
        let d = DeadlockDetector::new();
        d.add_allocation(1, 1);
        d.add_allocation(2, 2);
        d.add_wait_for(1, 3);
        d.add_wait_for(2, 4);
        assert!(d.detect_deadlocks().is_empty());
        assert!(d.wait_for_graph().is_empty());
    }

    #[test]
    fn chain_without_cycle() {
        let d = DeadlockDetector::new();
        d.add_allocation(2, 20);
        d.add_allocation(3, 30);
        d.add_wait_for(1, 20);
        d.add_wait_for(2, 30);
        let graph = d.wait_for_graph();
        assert_eq!(graph.get(&1), Some(&vec![2]));
        assert_eq!(graph.get(&2), Some(&vec![3]));
        assert!(d.detect_deadlocks().is_empty());
    }

    #[test]
    fn waiting_on_own_resource_is_not_an_edge() {
        let d = DeadlockDetector::new();
        d.add_allocation(1, 1);
        d.add_wait_for(1, 1);
        assert!(d.wait_for_graph().is_empty());
    }

    #[test]
    fn three_process_ring_and_separate_pair() {
        let d = DeadlockDetector::new();
        // 1 -> 2 -> 3 -> 1
        d.add_allocation(1, 10);
        d.add_allocation(2, 20);
        d.add_allocation(3, 30);
        d.add_wait_for(1, 20);
        d.add_wait_for(2, 30);
        d.add_wait_for(3, 10);
        // 7 <-> 8
        d.add_allocation(7, 70);
        d.add_allocation(8, 80);
        d.add_wait_for(7, 80);
        d.add_wait_for(8, 70);

        let cycles = d.detect_deadlocks();
        assert_eq!(cycles, vec![vec![1, 2, 3, 1], vec![7, 8, 7]]);
    }

    #[test]
    fn cycle_behind_a_tail() {
        let d = DeadlockDetector::new();
        // 1 -> 2 -> 3 -> 2
        d.add_allocation(2, 20);
        d.add_allocation(3, 30);
        d.add_wait_for(1, 20);
        d.add_wait_for(2, 30);
        d.add_wait_for(3, 20);
        assert_eq!(d.detect_deadlocks(), vec![vec![2, 3, 2]]);
    }

    #[test]
    fn several_contended_resources_report_one_cycle() {
        let d = DeadlockDetector::new();
        d.add_allocation(1, 1);
        d.add_allocation(1, 3);
        d.add_allocation(2, 2);
        d.add_wait_for(1, 2);
        d.add_wait_for(2, 1);
        d.add_wait_for(2, 3);

        let graph = d.wait_for_graph();
        assert_eq!(graph.get(&1), Some(&vec![2]));
        assert_eq!(graph.get(&2), Some(&vec![1]));
        assert_eq!(d.detect_deadlocks(), vec![vec![1, 2, 1]]);
        assert_eq!(d.scan().cycles.len(), 1);
    }

    #[test]
    fn release_breaks_deadlock() {
        let d = DeadlockDetector::new();
        d.add_allocation(1, 1);
        d.add_allocation(2, 2);
        d.add_wait_for(1, 2);
        d.add_wait_for(2, 1);
        assert!(d.release(2, 2));
        assert!(!d.release(2, 2));
        assert!(d.detect_deadlocks().is_empty());

        d.add_allocation(2, 2);
        assert_eq!(d.detect_deadlocks().len(), 1);
        assert!(d.clear_wait(1, 2));
        assert!(d.detect_deadlocks().is_empty());

        d.add_wait_for(1, 2);
        d.remove_process(1);
        assert!(d.detect_deadlocks().is_empty());
    }

    #[test]
    fn scan_report_renders_cycles() {
        let d = DeadlockDetector::new();
        assert!(d.scan().is_clear());
        d.add_allocation(1, 1);
        d.add_allocation(2, 2);
        d.add_wait_for(1, 2);
        d.add_wait_for(2, 1);
        let report = d.scan();
        assert_eq!(report.to_string(), "1 deadlock(s): #1 [1 → 2 → 1]");
    }

    #[test]
    fn concurrent_mutation_and_detection() {
        let d = Arc::new(DeadlockDetector::new());
        let writers: Vec<_> = (0..4u64)
            .map(|p| {
                let d = Arc::clone(&d);
                thread::spawn(move || {
                    for r in 0..100u64 {
                        d.add_allocation(p, p * 1000 + r);
                        let _ = d.detect_deadlocks();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert!(d.detect_deadlocks().is_empty());
    }
}

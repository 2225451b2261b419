//! Connection numbering and lifecycle bookkeeping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Lifecycle state of a numbered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
    Aborted,
}

/// Issues connection numbers and tracks which connections are open.
///
/// Numbers start at 1, increase strictly and are never reused. One registry
/// is shared by every spied connection of a [`SpyContext`](crate::SpyContext).
/// Only open and aborted connections are kept; a closed connection's entry is
/// removed and its number reports [`ConnectionState::Closed`] from then on.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    last_number: AtomicU64,
    states: Mutex<BTreeMap<u64, ConnectionState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next connection number.
    pub fn issue_number(&self) -> u64 {
        self.last_number.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn mark_open(&self, number: u64) {
        self.lock().insert(number, ConnectionState::Open);
    }

    pub fn mark_closed(&self, number: u64) {
        self.lock().remove(&number);
    }

    pub fn mark_aborted(&self, number: u64) {
        self.lock().insert(number, ConnectionState::Aborted);
    }

    /// State of `number`, or `None` if it was never issued.
    pub fn state(&self, number: u64) -> Option<ConnectionState> {
        if let Some(state) = self.lock().get(&number) {
            return Some(*state);
        }
        let issued = (1..=self.last_number.load(Ordering::Relaxed)).contains(&number);
        issued.then_some(ConnectionState::Closed)
    }

    /// Number of tracked entries, open and aborted.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Numbers of currently open connections, ascending.
    pub fn open_connections(&self) -> Vec<u64> {
        self.lock()
            .iter()
            .filter(|(_, state)| **state == ConnectionState::Open)
            .map(|(number, _)| *number)
            .collect()
    }

    /// One-line listing of open connections, e.g. `open connections:  1 3 (2)`.
    pub fn dump(&self) -> String {
        let open = self.open_connections();
        let mut out = String::from("open connections: ");
        for number in &open {
            out.push(' ');
            out.push_str(&number.to_string());
        }
        out.push_str(&format!(" ({})", open.len()));
        out
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, ConnectionState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn numbers_start_at_one_and_increase() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.issue_number(), 1);
        assert_eq!(registry.issue_number(), 2);
        assert_eq!(registry.issue_number(), 3);
    }

    #[test]
    fn dump_lists_open_connections_in_order() {
        let registry = ConnectionRegistry::new();
        for _ in 0..3 {
            registry.issue_number();
        }
        for n in [3, 1, 2] {
            registry.mark_open(n);
        }
        registry.mark_closed(2);
        assert_eq!(registry.dump(), "open connections:  1 3 (2)");
        assert_eq!(registry.state(2), Some(ConnectionState::Closed));

        registry.mark_aborted(1);
        registry.mark_closed(3);
        assert_eq!(registry.dump(), "open connections:  (0)");
        assert!(registry.open_connections().is_empty());
    }

    #[test]
    fn closed_connections_are_not_kept() {
        let registry = ConnectionRegistry::new();
        for _ in 0..1000 {
            let n = registry.issue_number();
            registry.mark_open(n);
            registry.mark_closed(n);
        }
        let aborted = registry.issue_number();
        registry.mark_open(aborted);
        registry.mark_aborted(aborted);
        let open = registry.issue_number();
        registry.mark_open(open);

        assert_eq!(registry.tracked(), 2);
        assert_eq!(registry.state(1), Some(ConnectionState::Closed));
        assert_eq!(registry.state(1000), Some(ConnectionState::Closed));
        assert_eq!(registry.state(aborted), Some(ConnectionState::Aborted));
        assert_eq!(registry.state(open), Some(ConnectionState::Open));
        assert_eq!(registry.state(0), None);
        assert_eq!(registry.state(open + 1), None);
        assert_eq!(registry.dump(), "open connections:  1002 (1)");
    }

    #[test]
    fn concurrent_issuing_never_repeats() {
        let registry = Arc::new(ConnectionRegistry::new());
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| {
                            let n = registry.issue_number();
                            registry.mark_open(n);
                            n
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        for handle in handles {
            for n in handle.join().expect("worker panicked") {
                assert!(seen.insert(n), "number {n} issued twice");
            }
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(seen, (1..=total).collect());
        assert_eq!(registry.open_connections().len() as u64, total);
    }
}

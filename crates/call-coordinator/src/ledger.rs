use std::collections::HashSet;

use signal_proto::IceCandidateRecord;

/// Remote candidates seen in the mailbox, split into applied and pending.
///
/// Candidates can show up before the remote description they belong to. Such
/// a candidate fails to apply, stays pending and is retried on the next poll,
/// so the end state does not depend on arrival order.
#[derive(Debug, Default)]
pub struct CandidateLedger {
    applied: HashSet<String>,
    queued: HashSet<String>,
    pending: Vec<IceCandidateRecord>,
}

impl CandidateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues candidates never seen before. Returns how many were new.
    pub fn observe(&mut self, candidates: &[IceCandidateRecord]) -> usize {
        let mut fresh = 0;
        for candidate in candidates {
            let key = candidate.dedup_key();
            if self.applied.contains(&key) || !self.queued.insert(key) {
                continue;
            }
            self.pending.push(candidate.clone());
            fresh += 1;
        }
        fresh
    }

    /// Hands out the pending batch. Each candidate must come back through
    /// [`mark_applied`](Self::mark_applied) or [`requeue`](Self::requeue).
    pub fn take_pending(&mut self) -> Vec<IceCandidateRecord> {
        std::mem::take(&mut self.pending)
    }

    pub fn mark_applied(&mut self, candidate: &IceCandidateRecord) {
        let key = candidate.dedup_key();
        self.queued.remove(&key);
        self.applied.insert(key);
    }

    pub fn requeue(&mut self, candidate: IceCandidateRecord) {
        self.pending.push(candidate);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn applied_len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_applied(&self, candidate: &IceCandidateRecord) -> bool {
        self.applied.contains(&candidate.dedup_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(line: &str) -> IceCandidateRecord {
        IceCandidateRecord::new(line)
    }

    #[test_timeout::timeout]
    fn repeated_polls_do_not_duplicate() {
        let mut ledger = CandidateLedger::new();
        let room = vec![cand("c1"), cand("c2")];
        assert_eq!(ledger.observe(&room), 2);
        assert_eq!(ledger.observe(&room), 0);
        assert_eq!(ledger.pending_len(), 2);

        for candidate in ledger.take_pending() {
            ledger.mark_applied(&candidate);
        }
        assert_eq!(ledger.observe(&room), 0);
        assert_eq!(ledger.applied_len(), 2);
    }

    #[test_timeout::timeout]
    fn failed_candidates_survive_until_applied() {
        let mut ledger = CandidateLedger::new();
        ledger.observe(&[cand("early")]);

        // Remote description not set yet.
        for candidate in ledger.take_pending() {
            ledger.requeue(candidate);
        }
        assert_eq!(ledger.observe(&[cand("early")]), 0);
        assert_eq!(ledger.pending_len(), 1);

        let batch = ledger.take_pending();
        ledger.mark_applied(&batch[0]);
        assert!(ledger.is_applied(&cand("early")));
        assert_eq!(ledger.pending_len(), 0);
    }

    #[test_timeout::timeout]
    fn arrival_order_does_not_change_the_result() {
        let forward = vec![cand("a"), cand("b"), cand("c")];
        let mut reversed = forward.clone();
        reversed.reverse();

        let drain = |order: &[IceCandidateRecord]| {
            let mut ledger = CandidateLedger::new();
            for prefix in 1..=order.len() {
                ledger.observe(&order[..prefix]);
                for candidate in ledger.take_pending() {
                    ledger.mark_applied(&candidate);
                }
            }
            let mut keys: Vec<_> = order
                .iter()
                .filter(|c| ledger.is_applied(c))
                .map(|c| c.candidate.clone())
                .collect();
            keys.sort();
            keys
        };
        assert_eq!(drain(&forward), drain(&reversed));
        assert_eq!(drain(&forward).len(), 3);
    }
}

use std::collections::BTreeSet;
use std::fmt;
use rand::{thread_rng, Rng};

use crate::endpoint::Endpoint;
use crate::message::RemoteRecord;

/// Liveness status tagged on a membership record.
///
/// A record turns `Suspect` once its heartbeat has not advanced for the
/// fail timeout; a strictly greater heartbeat arriving later refutes the
/// suspicion. Removal happens separately, after the remove timeout has
/// also elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberStatus {
    Alive,
    Suspect,
}

impl MemberStatus {
    pub fn is_suspect(&self) -> bool {
        matches!(self, MemberStatus::Suspect)
    }
}

impl Default for MemberStatus {
    fn default() -> Self {
        MemberStatus::Alive
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberStatus::Alive => write!(f, "Alive"),
            MemberStatus::Suspect => write!(f, "Suspect"),
        }
    }
}

/// One row of a node's membership view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRecord {
    pub endpoint: Endpoint,
    /// Monotonically non-decreasing liveness counter, incremented only by
    /// the record's owner.
    pub heartbeat: u64,
    /// Logical timestamp of the last local update to this row. Always
    /// stamped with the local clock, never with a peer's.
    pub last_update: u64,
    pub status: MemberStatus,
}

impl MemberRecord {
    fn new(endpoint: Endpoint, heartbeat: u64, now: u64) -> Self {
        Self {
            endpoint,
            heartbeat,
            last_update: now,
            status: MemberStatus::Alive,
        }
    }

    fn to_remote(self) -> RemoteRecord {
        RemoteRecord {
            endpoint: self.endpoint,
            heartbeat: self.heartbeat,
            timestamp: self.last_update,
        }
    }
}

/// The per-node membership table.
///
/// Owned exclusively by one engine instance and mutated only on its tick
/// path, so no interior locking is needed. Invariants: endpoints are
/// unique, and record 0 is always the owning node's own record — it is
/// never merge-updated by foreign heartbeats and never expired.
#[derive(Debug, Default)]
pub struct Membership {
    records: Vec<MemberRecord>,
}

impl Membership {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Clears the table. Used once at node init, before any record exists.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Appends the owner's own record with heartbeat 0. Must be called
    /// exactly once, before any merge, so that it lands at record 0.
    pub fn insert_self(&mut self, endpoint: Endpoint, now: u64) {
        debug_assert!(
            self.records.is_empty(),
            "insert_self called on a non-empty table"
        );
        self.records.push(MemberRecord::new(endpoint, 0, now));
    }

    /// Direct insert, used by the coordinator when admitting a joiner.
    /// Returns false without touching the table if the endpoint is
    /// already present.
    pub fn insert(&mut self, endpoint: Endpoint, heartbeat: u64, now: u64) -> bool {
        if self.contains(endpoint) {
            return false;
        }
        self.records.push(MemberRecord::new(endpoint, heartbeat, now));
        true
    }

    /// Merges a received table snapshot into this one, returning the
    /// endpoints that were newly added.
    ///
    /// A known row is updated only when the incoming heartbeat is
    /// strictly greater; the update re-stamps `last_update` with the
    /// local `now` and refutes any suspicion. Ties and stale rows are
    /// ignored so duplicate gossip cannot regress a timestamp. The
    /// owner's own record is never updated from a snapshot.
    pub fn merge(&mut self, incoming: &[RemoteRecord], now: u64) -> Vec<Endpoint> {
        let own = self.records.first().map(|record| record.endpoint);
        let mut added = Vec::new();

        for remote in incoming {
            if Some(remote.endpoint) == own {
                continue;
            }
            match self
                .records
                .iter_mut()
                .find(|record| record.endpoint == remote.endpoint)
            {
                Some(existing) => {
                    if remote.heartbeat > existing.heartbeat {
                        existing.heartbeat = remote.heartbeat;
                        existing.last_update = now;
                        existing.status = MemberStatus::Alive;
                    }
                }
                None => {
                    self.records
                        .push(MemberRecord::new(remote.endpoint, remote.heartbeat, now));
                    added.push(remote.endpoint);
                }
            }
        }

        added
    }

    /// Runs failure detection over every record except the owner's own,
    /// returning the endpoints removed.
    ///
    /// A record idle for at least `fail_timeout` is marked suspect; one
    /// idle for at least `fail_timeout + remove_timeout` is removed.
    pub fn expire(&mut self, now: u64, fail_timeout: u64, remove_timeout: u64) -> Vec<Endpoint> {
        let mut removed = Vec::new();
        let mut index = 1;
        while index < self.records.len() {
            let age = now.saturating_sub(self.records[index].last_update);
            if age >= fail_timeout + remove_timeout {
                removed.push(self.records.remove(index).endpoint);
                continue;
            }
            if age >= fail_timeout {
                self.records[index].status = MemberStatus::Suspect;
            }
            index += 1;
        }
        removed
    }

    /// Advances the owner's own heartbeat. Called once per gossip round,
    /// before fan-out, so every round advances the local liveness signal.
    pub fn tick_self(&mut self, now: u64) {
        debug_assert!(!self.records.is_empty(), "tick_self before insert_self");
        if let Some(own) = self.records.first_mut() {
            own.heartbeat += 1;
            own.last_update = now;
        }
    }

    /// Picks `min(k, len - 1)` distinct record indices uniformly at
    /// random, never index 0, for gossip fan-out.
    pub fn sample_fanout(&self, k: usize) -> Vec<usize> {
        let len = self.records.len();
        if len <= 1 {
            return Vec::new();
        }

        let eligible = len - 1;
        let want = k.min(eligible);
        if want == eligible {
            return (1..len).collect();
        }

        let mut rng = thread_rng();
        let mut chosen = BTreeSet::new();
        while chosen.len() < want {
            chosen.insert(rng.gen_range(1..len));
        }
        chosen.into_iter().collect()
    }

    /// Full-table snapshot in wire form, for an UPDATE payload.
    pub fn snapshot(&self) -> Vec<RemoteRecord> {
        self.records.iter().map(|record| record.to_remote()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, endpoint: Endpoint) -> bool {
        self.records.iter().any(|record| record.endpoint == endpoint)
    }

    /// The owner's own record, if `insert_self` has run.
    pub fn self_record(&self) -> Option<&MemberRecord> {
        self.records.first()
    }

    pub fn get(&self, endpoint: Endpoint) -> Option<&MemberRecord> {
        self.records.iter().find(|record| record.endpoint == endpoint)
    }

    pub fn records(&self) -> &[MemberRecord] {
        &self.records
    }

    pub(crate) fn record_at(&self, index: usize) -> Option<&MemberRecord> {
        self.records.get(index)
    }
}

//! Decaying per-peer availability of one file.
//!
//! A MISSING reply (or a timeout) marks a peer unavailable for a while. The
//! length of that window comes from a [`RetryPolicy`] indexed by the number of
//! consecutive unavailability episodes, so a peer that keeps lacking the file
//! is retried less and less often. A single positive reply resets the count.

use std::collections::HashMap;
use std::time::Instant;

use swarmshare_core::PeerId;

use crate::policy::RetryPolicy;

/// What is known about a peer's possession of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    /// The peer recently served data for the file.
    Available,
    /// The peer recently reported the data missing and the window has not expired.
    Unavailable,
    /// Nothing is known, or a past unavailability has decayed.
    AvailabilityExpired,
}

/// End of an unavailability window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    /// No window has been opened yet.
    Unset,
    At(Instant),
    /// The policy gave up; the window only closes on a positive report.
    Never,
}

impl Expiry {
    fn has_passed(self, now: Instant) -> bool {
        match self {
            Self::Unset => true,
            Self::At(deadline) => now > deadline,
            Self::Never => false,
        }
    }
}

/// Reputation record for one peer.
#[derive(Debug, Clone)]
struct PeerAvailability {
    available: bool,
    /// Consecutive unavailability episodes since the last positive report.
    unavailable_count: u32,
    expires: Expiry,
}

impl PeerAvailability {
    fn new() -> Self {
        Self {
            available: false,
            unavailable_count: 0,
            expires: Expiry::Unset,
        }
    }

    fn get(&self, now: Instant) -> Availability {
        if self.available {
            Availability::Available
        } else if self.expires.has_passed(now) {
            Availability::AvailabilityExpired
        } else {
            Availability::Unavailable
        }
    }

    /// Returns `true` if this update opened a new unavailability episode.
    fn update(&mut self, available: bool, policy: &RetryPolicy, now: Instant) -> bool {
        let was_available = self.available;
        self.available = available;
        if available {
            self.unavailable_count = 0;
            return false;
        }
        // Inside an open window, repeated reports must not extend it.
        if !was_available && !self.expires.has_passed(now) {
            return false;
        }
        self.unavailable_count = self.unavailable_count.saturating_add(1);
        self.expires = match policy.interval(self.unavailable_count - 1) {
            Some(interval) => Expiry::At(now + interval),
            None => Expiry::Never,
        };
        true
    }
}

/// Availability of one file across all known peers.
#[derive(Debug, Clone)]
pub struct AvailabilityMap {
    policy: RetryPolicy,
    peers: HashMap<PeerId, PeerAvailability>,
}

impl AvailabilityMap {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            peers: HashMap::new(),
        }
    }

    /// Availability at `peer` as of `now`. Unknown peers are expired.
    #[must_use]
    pub fn get(&self, peer: PeerId, now: Instant) -> Availability {
        self.peers
            .get(&peer)
            .map_or(Availability::AvailabilityExpired, |record| record.get(now))
    }

    /// Record a positive or negative report from `peer`.
    pub fn set(&mut self, peer: PeerId, available: bool, now: Instant) {
        let record = self.peers.entry(peer).or_insert_with(PeerAvailability::new);
        if record.update(available, &self.policy, now) {
            tracing::debug!(
                peer = %peer,
                episodes = record.unavailable_count,
                expires = ?record.expires,
                "peer marked unavailable"
            );
        }
    }

    /// Forget everything about `peer`.
    pub fn remove(&mut self, peer: PeerId) {
        self.peers.remove(&peer);
    }

    /// Consecutive unavailability episodes recorded for `peer`.
    #[must_use]
    pub fn unavailable_count(&self, peer: PeerId) -> u32 {
        self.peers.get(&peer).map_or(0, |r| r.unavailable_count)
    }

    /// End of `peer`'s current unavailability window, if it has a finite one.
    #[must_use]
    pub fn expires_at(&self, peer: PeerId) -> Option<Instant> {
        match self.peers.get(&peer)?.expires {
            Expiry::At(deadline) => Some(deadline),
            Expiry::Unset | Expiry::Never => None,
        }
    }

    /// Number of peers with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

//! Pending requests from one player to teleport to another.
//!
//! One request is kept per (requester, target) pair. Requests older than the
//! expiration window are treated as absent, so no background sweep is
//! needed, though [`TravelRequestStore::purge_expired`] is there for one.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use scc::HashMap;
use tokio::time::Instant;
use uuid::Uuid;

/// A request from `requester` to teleport to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelRequest {
    /// The player asking to travel.
    pub requester: Uuid,
    /// The requester's display name at the time of the request.
    pub requester_name: String,
    /// The player being travelled to.
    pub target: Uuid,
    /// When the request was made.
    pub created_at: Instant,
    sequence: u64,
}

impl TravelRequest {
    fn is_expired(&self, now: Instant, expiration: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > expiration
    }

    /// Orders requests made at the same instant by creation order.
    fn age_key(&self) -> (Instant, u64) {
        (self.created_at, self.sequence)
    }
}

type RequestKey = (Uuid, Uuid);

/// All pending travel requests, keyed by (requester, target).
pub struct TravelRequestStore {
    requests: HashMap<RequestKey, TravelRequest>,
    expiration: Duration,
    sequence: AtomicU64,
}

impl TravelRequestStore {
    /// Creates an empty store whose requests expire after `expiration`.
    #[must_use]
    pub fn new(expiration: Duration) -> Self {
        Self {
            requests: HashMap::new(),
            expiration,
            sequence: AtomicU64::new(0),
        }
    }

    /// How long a request stays valid.
    #[must_use]
    pub const fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Records a request, replacing any earlier one for the same pair.
    ///
    /// Returns `false` if a live request for the pair already existed, in
    /// which case the target should not be notified again.
    pub fn create(&self, requester: Uuid, requester_name: &str, target: Uuid) -> bool {
        let now = Instant::now();
        let mut request = TravelRequest {
            requester,
            requester_name: requester_name.to_owned(),
            target,
            created_at: now,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let key = (requester, target);

        loop {
            let replaced = self.requests.update_sync(&key, |_, existing| {
                let was_live = !existing.is_expired(now, self.expiration);
                *existing = request.clone();
                was_live
            });
            if let Some(was_live) = replaced {
                return !was_live;
            }
            match self.requests.insert_sync(key, request) {
                Ok(()) => return true,
                // Inserted concurrently, replace that one instead
                Err((_, rejected)) => request = rejected,
            }
        }
    }

    /// Takes the newest live request addressed to `target`.
    pub fn accept_most_recent(&self, target: Uuid) -> Option<TravelRequest> {
        self.take_matching(target, |_| true)
    }

    /// Takes the live request `requester_name` sent to `target`. Names are
    /// compared ignoring case.
    pub fn accept_from(&self, target: Uuid, requester_name: &str) -> Option<TravelRequest> {
        self.take_matching(target, |request| {
            request.requester_name.eq_ignore_ascii_case(requester_name)
        })
    }

    fn take_matching<F>(&self, target: Uuid, matches: F) -> Option<TravelRequest>
    where
        F: Fn(&TravelRequest) -> bool,
    {
        loop {
            let now = Instant::now();
            let mut newest: Option<(RequestKey, (Instant, u64))> = None;
            self.requests.iter_sync(|key, request| {
                if key.1 == target
                    && !request.is_expired(now, self.expiration)
                    && matches(request)
                    && newest.is_none_or(|(_, age)| request.age_key() > age)
                {
                    newest = Some((*key, request.age_key()));
                }
                true
            });

            let (key, age) = newest?;
            if let Some((_, request)) = self
                .requests
                .remove_if_sync(&key, |request| request.age_key() == age)
            {
                return Some(request);
            }
            // Replaced or accepted concurrently, look again
        }
    }

    /// Live requests addressed to `target`, newest first.
    #[must_use]
    pub fn pending_for(&self, target: Uuid) -> Vec<TravelRequest> {
        let now = Instant::now();
        let mut pending = Vec::new();
        self.requests.iter_sync(|key, request| {
            if key.1 == target && !request.is_expired(now, self.expiration) {
                pending.push(request.clone());
            }
            true
        });
        pending.sort_by_key(|request| std::cmp::Reverse(request.age_key()));
        pending
    }

    /// Removes every request `player` sent or received.
    pub fn on_player_quit(&self, player: Uuid) {
        let removed = self.remove_where(|key, _| key.0 == player || key.1 == player);
        if removed > 0 {
            log::debug!("Cleared {removed} travel requests of {player}");
        }
    }

    /// Removes expired requests. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.remove_where(|_, request| request.is_expired(now, self.expiration))
    }

    /// Number of stored requests, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RequestKey, &TravelRequest) -> bool,
    {
        let mut doomed = Vec::new();
        self.requests.iter_sync(|key, request| {
            if predicate(key, request) {
                doomed.push((*key, request.age_key()));
            }
            true
        });

        doomed
            .into_iter()
            .filter(|(key, age)| {
                self.requests
                    .remove_if_sync(key, |request| request.age_key() == *age)
                    .is_some()
            })
            .count()
    }
}

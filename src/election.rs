//! Host election
//!
//! A client that finds the host slot empty claims it and broadcasts the
//! claim. Competing claims are settled deterministically: the lowest claimant
//! id wins, so once every claim has been delivered all clients agree on the
//! same host no matter in which order the claims arrived. After the session
//! has started the settled host is locked in and later claims are ignored.

use tracing::{debug, warn};

use crate::roster::Id;

/// Result of observing a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claimant is now the host known to this client
    Adopted,
    /// The claim lost against the current host or arrived too late
    Ignored,
}

/// Election state held by one client
#[derive(Debug, Clone)]
pub struct Election {
    /// This client's id
    local: Id,
    /// The host this client currently follows
    host: Option<Id>,
    /// Whether the session has started and the host is frozen
    locked: bool,
}

impl Election {
    /// Creates the election state for a client with no known host
    pub fn new(local: Id) -> Self {
        Self {
            local,
            host: None,
            locked: false,
        }
    }

    /// The host this client currently follows
    pub fn host(&self) -> Option<Id> {
        self.host
    }

    /// Whether this client is the host
    pub fn am_host(&self) -> bool {
        self.host == Some(self.local)
    }

    /// Whether no host is known yet
    pub fn is_vacant(&self) -> bool {
        self.host.is_none()
    }

    /// Claims the host slot if it is empty
    ///
    /// # Returns
    ///
    /// The local id when the claim was made and must be broadcast, otherwise
    /// `None`
    pub fn claim(&mut self) -> Option<Id> {
        if self.host.is_some() {
            return None;
        }
        debug!(host = %self.local, "claiming vacant host slot");
        self.host = Some(self.local);
        Some(self.local)
    }

    /// Applies a claim observed on the channel
    pub fn observe_claim(&mut self, claimant: Id) -> ClaimOutcome {
        match self.host {
            Some(host) if host == claimant => ClaimOutcome::Ignored,
            Some(host) if self.locked => {
                debug!(%host, %claimant, "ignoring claim after session start");
                ClaimOutcome::Ignored
            }
            Some(host) if host < claimant => ClaimOutcome::Ignored,
            previous => {
                debug!(?previous, %claimant, "adopting host claim");
                self.host = Some(claimant);
                ClaimOutcome::Adopted
            }
        }
    }

    /// Freezes the current host for the rest of the session
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Follows a host that has started the session and freezes it
    pub fn follow(&mut self, host: Id) {
        if self.host != Some(host) {
            debug!(previous = ?self.host, %host, "following session host");
        }
        self.host = Some(host);
        self.locked = true;
    }

    /// Whether the host is frozen
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Lets claims compete again
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Handles a departing client
    ///
    /// The slot is only cleared before the session starts; a host that leaves
    /// mid-session is not replaced.
    pub fn forget(&mut self, id: Id) {
        if self.host != Some(id) {
            return;
        }
        if self.locked {
            warn!(host = %id, "host left during the session; no replacement is elected");
        } else {
            debug!(host = %id, "host left before the start; slot is vacant again");
            self.host = None;
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use itertools::Itertools;
    use proptest::prelude::*;

    #[test]
    fn test_claim_vacant_slot() {
        let local = Id::new();
        let mut election = Election::new(local);

        assert!(election.is_vacant());
        assert_eq!(election.claim(), Some(local));
        assert!(election.am_host());
        assert_eq!(election.claim(), None);
    }

    #[test]
    fn test_claim_after_observing_host_is_refused() {
        let mut election = Election::new(Id::from_u128(1));
        assert_eq!(
            election.observe_claim(Id::from_u128(5)),
            ClaimOutcome::Adopted
        );
        assert_eq!(election.claim(), None);
        assert!(!election.am_host());
        assert_eq!(election.host(), Some(Id::from_u128(5)));
    }

    #[test]
    fn test_lowest_claim_wins() {
        let mut election = Election::new(Id::from_u128(9));
        election.claim();

        assert_eq!(
            election.observe_claim(Id::from_u128(3)),
            ClaimOutcome::Adopted
        );
        assert_eq!(
            election.observe_claim(Id::from_u128(7)),
            ClaimOutcome::Ignored
        );
        assert_eq!(election.host(), Some(Id::from_u128(3)));
        assert!(!election.am_host());
    }

    #[test]
    fn test_locked_host_ignores_lower_claims() {
        let mut election = Election::new(Id::from_u128(5));
        election.claim();
        election.lock();

        assert_eq!(
            election.observe_claim(Id::from_u128(1)),
            ClaimOutcome::Ignored
        );
        assert!(election.am_host());

        election.unlock();
        assert_eq!(
            election.observe_claim(Id::from_u128(1)),
            ClaimOutcome::Adopted
        );
    }

    #[test]
    fn test_follow_overrides_and_locks() {
        let mut election = Election::new(Id::from_u128(1));
        election.claim();

        election.follow(Id::from_u128(8));
        assert!(election.is_locked());
        assert!(!election.am_host());
        assert_eq!(
            election.observe_claim(Id::from_u128(1)),
            ClaimOutcome::Ignored
        );
        assert_eq!(election.host(), Some(Id::from_u128(8)));
    }

    #[test]
    fn test_forget_host_before_start() {
        let host = Id::from_u128(2);
        let mut election = Election::new(Id::from_u128(4));
        election.observe_claim(host);

        election.forget(Id::from_u128(99));
        assert_eq!(election.host(), Some(host));

        election.forget(host);
        assert!(election.is_vacant());
    }

    #[test]
    fn test_forget_host_after_start_keeps_slot() {
        let host = Id::from_u128(2);
        let mut election = Election::new(Id::from_u128(4));
        election.observe_claim(host);
        election.lock();

        election.forget(host);
        assert_eq!(election.host(), Some(host));
    }

    proptest! {
        /// Whatever order claims arrive in, every client settles on the same
        /// host and exactly one client believes it is the host.
        #[test]
        fn prop_single_host(
            claimant_count in 1usize..6,
            bystander_count in 0usize..4,
            seed in any::<u64>(),
        ) {
            let ids = (0..claimant_count + bystander_count)
                .map(|_| Id::new())
                .collect_vec();
            let mut clients = ids.iter().map(|id| Election::new(*id)).collect_vec();

            let claims = clients
                .iter_mut()
                .take(claimant_count)
                .filter_map(Election::claim)
                .collect_vec();

            let mut rng = fastrand::Rng::with_seed(seed);
            for client in &mut clients {
                let mut delivery = claims.clone();
                rng.shuffle(&mut delivery);
                for claim in delivery {
                    client.observe_claim(claim);
                }
            }

            let expected = claims.iter().min().copied();
            prop_assert!(clients.iter().all(|c| c.host() == expected));
            prop_assert_eq!(clients.iter().filter(|c| c.am_host()).count(), 1);
        }
    }
}

//! Player identity and roster management
//!
//! This module defines the identifiers used for every client in a session and
//! the join-ordered roster each client keeps of the players it has observed on
//! the broadcast channel. The session only ever holds player ids; display
//! names live in the roster and are looked up when rendering.

use std::{collections::HashMap, fmt::Display, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

/// A unique identifier for a client in the session
///
/// Ids are totally ordered, which host election relies on: among competing
/// claims the lowest id wins.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random player ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an ID from a fixed integer, mostly useful for deterministic setups
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl Default for Id {
    /// Creates a new random player ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A participant as announced on the channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// The player's stable identifier
    pub id: Id,
    /// The name shown on the leaderboard
    pub display_name: String,
}

impl Player {
    /// Creates a new player record
    pub fn new(id: Id, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Errors that can occur when managing the roster
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The session has reached the maximum number of allowed players
    #[error("maximum number of players reached")]
    MaximumPlayers,
}

/// Join-ordered set of known players
///
/// Join order is the order in which this client first observed each player
/// and is used to break leaderboard ties deterministically.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    /// Player records by id
    mapping: HashMap<Id, Player>,
    /// Ids in join order
    order: Vec<Id>,
}

impl Roster {
    /// Adds a player, or refreshes the display name of a known one
    ///
    /// A player who is already present keeps their original join position.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the player is new, `Ok(false)` if they were already known
    ///
    /// # Errors
    ///
    /// Returns `Error::MaximumPlayers` if adding a new player would exceed
    /// the maximum allowed number of participants.
    pub fn add(&mut self, player: Player) -> Result<bool, Error> {
        if let Some(existing) = self.mapping.get_mut(&player.id) {
            existing.display_name = player.display_name;
            return Ok(false);
        }

        if self.mapping.len() >= crate::constants::session::MAX_PLAYER_COUNT {
            return Err(Error::MaximumPlayers);
        }

        self.order.push(player.id);
        self.mapping.insert(player.id, player);

        Ok(true)
    }

    /// Removes a player, returning their record if they were known
    pub fn remove(&mut self, id: Id) -> Option<Player> {
        let player = self.mapping.remove(&id)?;
        self.order.retain(|x| *x != id);
        Some(player)
    }

    /// Checks if a player is part of the roster
    pub fn contains(&self, id: Id) -> bool {
        self.mapping.contains_key(&id)
    }

    /// Gets a player's record
    pub fn get(&self, id: Id) -> Option<&Player> {
        self.mapping.get(&id)
    }

    /// Gets the display name of a player
    pub fn name(&self, id: Id) -> Option<&str> {
        self.mapping.get(&id).map(|p| p.display_name.as_str())
    }

    /// Gets the join position of a player (0 for the earliest)
    pub fn join_position(&self, id: Id) -> Option<usize> {
        self.order.iter().position(|x| *x == id)
    }

    /// Ids of all players in join order
    pub fn ids(&self) -> Vec<Id> {
        self.order.clone()
    }

    /// Player records in join order
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.order.iter().filter_map(|id| self.mapping.get(id))
    }

    /// Number of known players
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no players are known
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Display names of all players in join order
    pub fn names(&self) -> Vec<String> {
        self.players()
            .map(|p| p.display_name.clone())
            .collect_vec()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trips_through_string() {
        let id = Id::new();
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<Id>().is_err());
    }

    #[test]
    fn test_id_ordering_is_numeric() {
        assert!(Id::from_u128(1) < Id::from_u128(2));
        assert!(Id::from_u128(0xff) > Id::from_u128(0x0f));
    }

    #[test]
    fn test_id_serializes_as_string() {
        let id = Id::from_u128(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000007\"");
    }

    #[test]
    fn test_roster_keeps_join_order() {
        let mut roster = Roster::default();
        let (a, b, c) = (Id::from_u128(3), Id::from_u128(1), Id::from_u128(2));

        assert_eq!(roster.add(Player::new(a, "A")), Ok(true));
        assert_eq!(roster.add(Player::new(b, "B")), Ok(true));
        assert_eq!(roster.add(Player::new(c, "C")), Ok(true));

        assert_eq!(roster.ids(), vec![a, b, c]);
        assert_eq!(roster.join_position(b), Some(1));
        assert_eq!(roster.names(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_roster_rejoin_keeps_position_and_updates_name() {
        let mut roster = Roster::default();
        let (a, b) = (Id::new(), Id::new());
        roster.add(Player::new(a, "A")).unwrap();
        roster.add(Player::new(b, "B")).unwrap();

        assert_eq!(roster.add(Player::new(a, "Renamed")), Ok(false));
        assert_eq!(roster.ids(), vec![a, b]);
        assert_eq!(roster.name(a), Some("Renamed"));
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_roster_remove() {
        let mut roster = Roster::default();
        let (a, b) = (Id::new(), Id::new());
        roster.add(Player::new(a, "A")).unwrap();
        roster.add(Player::new(b, "B")).unwrap();

        assert_eq!(roster.remove(a).map(|p| p.display_name), Some("A".into()));
        assert!(roster.remove(a).is_none());
        assert!(!roster.contains(a));
        assert_eq!(roster.ids(), vec![b]);
        assert_eq!(roster.join_position(b), Some(0));
    }

    #[test]
    fn test_roster_player_limit() {
        let mut roster = Roster::default();
        for _ in 0..crate::constants::session::MAX_PLAYER_COUNT {
            roster.add(Player::new(Id::new(), "P")).unwrap();
        }
        assert_eq!(
            roster.add(Player::new(Id::new(), "Late")),
            Err(Error::MaximumPlayers)
        );
    }

    #[test]
    fn test_empty_roster() {
        let roster = Roster::default();
        assert!(roster.is_empty());
        assert_eq!(roster.len(), 0);
        assert!(roster.ids().is_empty());
    }
}

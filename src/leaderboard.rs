//! Leaderboard and scoring functionality
//!
//! Ranking is a pure function of the accumulated scores and the roster. The
//! `Leaderboard` ledger keeps what each player earned on every revealed
//! question so that replays of the same reveal are recognised, and so that a
//! summary can be produced once the session ends.

use std::{cmp::Reverse, collections::HashMap};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    TruncatedVec, constants,
    roster::{Id, Roster},
};

/// One row of the ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// The ranked player
    pub player_id: Id,
    /// The name shown next to the score
    pub display_name: String,
    /// Accumulated score
    pub score: u64,
}

/// Ranks players by score
///
/// Every roster player appears, with a score of zero if they have none.
/// Players who scored but are no longer on the roster follow the roster
/// players in id order and are shown under their id. Sorting is by score
/// descending with ties kept in that order, so equal inputs always produce
/// equal output.
pub fn generate(scores: &HashMap<Id, u64>, roster: &Roster) -> Vec<LeaderboardEntry> {
    let known = roster.players().map(|player| LeaderboardEntry {
        player_id: player.id,
        display_name: player.display_name.clone(),
        score: scores.get(&player.id).copied().unwrap_or_default(),
    });

    let departed = scores
        .iter()
        .filter(|(id, _)| !roster.contains(**id))
        .sorted_by_key(|(id, _)| **id)
        .map(|(id, score)| LeaderboardEntry {
            player_id: *id,
            display_name: id.to_string(),
            score: *score,
        });

    known
        .chain(departed)
        .sorted_by_key(|entry| Reverse(entry.score))
        .collect_vec()
}

/// Cuts a ranking down to what one broadcast carries
pub fn truncate(entries: &[LeaderboardEntry]) -> TruncatedVec<LeaderboardEntry> {
    TruncatedVec::new(
        entries.iter().cloned(),
        constants::session::LEADERBOARD_LIMIT,
        entries.len(),
    )
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalSummary {
    /// For each revealed question, (players who scored, players who did not)
    stats: Vec<(usize, usize)>,
    /// For each player, the points earned on each revealed question
    mapping: HashMap<Id, Vec<u64>>,
}

impl FinalSummary {
    /// Per-question (scored, did not score) counts
    pub fn stats(&self) -> &[(usize, usize)] {
        &self.stats
    }

    /// Number of players who appear in at least one reveal
    pub fn player_count(&self) -> usize {
        self.mapping.len()
    }

    /// Points a player earned on each revealed question
    pub fn player(&self, id: Id) -> Vec<u64> {
        self.mapping
            .get(&id)
            .cloned()
            .unwrap_or_else(|| vec![0; self.stats.len()])
    }
}

/// Serialization helper for Leaderboard struct
#[derive(Deserialize)]
struct LeaderboardSerde {
    points_earned: Vec<(usize, Vec<(Id, u64)>)>,
}

/// Per-question score ledger
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "LeaderboardSerde")]
pub struct Leaderboard {
    /// Question index and the points each player earned on it
    points_earned: Vec<(usize, Vec<(Id, u64)>)>,

    /// Accumulated score per player (rebuilt from `points_earned`)
    #[serde(skip)]
    totals: HashMap<Id, u64>,
    /// Final session summary (computed once when needed)
    #[serde(skip)]
    final_summary: once_cell_serde::sync::OnceCell<FinalSummary>,
}

impl From<LeaderboardSerde> for Leaderboard {
    fn from(serde: LeaderboardSerde) -> Self {
        let totals = serde
            .points_earned
            .iter()
            .flat_map(|(_, earned)| earned.iter().copied())
            .sorted_by_key(|(id, _)| *id)
            .coalesce(|(id1, points1), (id2, points2)| {
                if id1 == id2 {
                    Ok((id1, points1 + points2))
                } else {
                    Err(((id1, points1), (id2, points2)))
                }
            })
            .collect();

        Leaderboard {
            points_earned: serde.points_earned,
            totals,
            final_summary: once_cell_serde::sync::OnceCell::new(),
        }
    }
}

impl Leaderboard {
    /// Records a question from the accumulated totals after its reveal
    ///
    /// The points earned are the difference to the totals known so far. The
    /// host and every participant record the same totals, so they all end up
    /// with the same history.
    ///
    /// # Returns
    ///
    /// `false` if this question was already recorded
    pub fn apply_totals(&mut self, question_index: usize, totals: &HashMap<Id, u64>) -> bool {
        if self.is_recorded(question_index) {
            trace!(question_index, "totals already applied");
            return false;
        }

        let earned = totals
            .iter()
            .sorted_by_key(|(id, _)| **id)
            .map(|(id, total)| (*id, total.saturating_sub(self.total(*id))))
            .collect_vec();

        self.points_earned.push((question_index, earned));
        self.totals.extend(totals.iter().map(|(id, total)| (*id, *total)));
        self.final_summary = once_cell_serde::sync::OnceCell::new();
        true
    }

    /// Whether a question's scores were recorded
    pub fn is_recorded(&self, question_index: usize) -> bool {
        self.points_earned.iter().any(|(i, _)| *i == question_index)
    }

    /// Accumulated score of a player
    pub fn total(&self, id: Id) -> u64 {
        self.totals.get(&id).copied().unwrap_or_default()
    }

    /// Accumulated score of every player who was scored
    pub fn totals(&self) -> &HashMap<Id, u64> {
        &self.totals
    }

    /// Number of recorded questions
    pub fn rounds(&self) -> usize {
        self.points_earned.len()
    }

    fn compute_final_summary(&self) -> FinalSummary {
        FinalSummary {
            stats: self
                .points_earned
                .iter()
                .map(|(_, points_earned)| {
                    let earned_count = points_earned
                        .iter()
                        .filter(|(_, earned)| *earned > 0)
                        .count();

                    (earned_count, points_earned.len() - earned_count)
                })
                .collect(),
            mapping: self
                .points_earned
                .iter()
                .enumerate()
                .fold(
                    HashMap::new(),
                    |mut aggregate: HashMap<Id, Vec<u64>>, (round, (_, points_earned))| {
                        for (id, points) in points_earned {
                            let history = aggregate.entry(*id).or_default();
                            history.resize(round, 0);
                            history.push(*points);
                        }
                        aggregate
                    },
                )
                .into_iter()
                .map(|(id, mut history)| {
                    history.resize(self.points_earned.len(), 0);
                    (id, history)
                })
                .collect(),
        }
    }

    /// Gets or computes the final summary
    ///
    /// The summary is cached until the next question is recorded.
    pub fn final_summary(&self) -> &FinalSummary {
        self.final_summary
            .get_or_init(|| self.compute_final_summary())
    }
}

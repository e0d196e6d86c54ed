//! # Quizcast
//!
//! Session coordination for a multiplayer quiz played by independent
//! clients that share nothing but a broadcast channel.
//!
//! Every client runs the same [`game::Game`] coordinator. One of them is
//! elected host and drives the question lifecycle; the others replay the
//! host's broadcasts, submit their answers and render the shared state
//! through the [`presentation`] adapter.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub mod aggregator;
pub mod channel;
pub mod config;
pub mod constants;
#[cfg(feature = "tokio")]
pub mod driver;
pub mod election;
pub mod game;
pub mod leaderboard;
pub mod message;
pub mod names;
pub mod presentation;
pub mod question;
pub mod roster;
pub mod session_id;
pub mod state;
pub mod timer;

/// A truncated vector that maintains the exact count while limiting carried items
///
/// Leaderboards travel on the channel as a `TruncatedVec`: the top rows plus
/// the number of players actually ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T: Clone> TruncatedVec<T> {
    /// Creates a new truncated vector from an iterator
    ///
    /// # Arguments
    ///
    /// * `list` - An iterator over items to include
    /// * `limit` - Maximum number of items to include in the truncated vector
    /// * `exact_count` - The exact total count of items (may be larger than limit)
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Maps a function over the carried items
    pub fn map<F, U>(self, f: F) -> TruncatedVec<U>
    where
        F: Fn(T) -> U,
    {
        TruncatedVec {
            exact_count: self.exact_count,
            items: self.items.into_iter().map(f).collect_vec(),
        }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the truncated items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_vec_new() {
        let truncated = TruncatedVec::new(vec![1, 2, 3, 4, 5].into_iter(), 3, 5);

        assert_eq!(truncated.exact_count(), 5);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_limit_larger_than_items() {
        let truncated = TruncatedVec::new(vec![1, 2, 3].into_iter(), 5, 3);

        assert_eq!(truncated.exact_count(), 3);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_default_is_empty() {
        let truncated = TruncatedVec::<String>::default();
        assert_eq!(truncated.exact_count(), 0);
        assert!(truncated.items().is_empty());
    }

    #[test]
    fn test_truncated_vec_map() {
        let mapped = TruncatedVec::new(vec![1, 2, 3].into_iter(), 2, 3).map(|x| format!("item_{x}"));

        assert_eq!(mapped.exact_count(), 3);
        assert_eq!(mapped.items(), &["item_1", "item_2"]);
    }

    #[test]
    fn test_truncated_vec_wire_shape() {
        let truncated = TruncatedVec::new(vec![7].into_iter(), 1, 4);
        let json = serde_json::to_value(&truncated).unwrap();
        assert_eq!(json, serde_json::json!({ "exactCount": 4, "items": [7] }));

        let back: TruncatedVec<i32> = serde_json::from_value(json).unwrap();
        assert_eq!(back, truncated);
    }
}

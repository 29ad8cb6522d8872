// src/services/ranking.rs

//! Leaderboard computation from the full submission history of one quiz.
//!
//! Only the latest attempt of each participant counts. Attempts with the same
//! `submitted_at` are ordered by submission id, so the later insert wins.
//! Ranks use competition ranking: equal (score, duration) pairs share a rank
//! and the next distinct pair is ranked by its 1-based position.

use std::{cmp::Ordering, collections::HashMap};

use crate::models::submission::{RankedEntry, Submission};

fn is_newer(candidate: &Submission, current: &Submission) -> bool {
    (candidate.submitted_at, candidate.id) > (current.submitted_at, current.id)
}

/// Keeps the latest attempt per participant name.
pub fn latest_per_participant(history: Vec<Submission>) -> Vec<Submission> {
    let mut latest: HashMap<String, Submission> = HashMap::new();
    for submission in history {
        let replace = latest
            .get(&submission.participant_name)
            .is_none_or(|current| is_newer(&submission, current));
        if replace {
            latest.insert(submission.participant_name.clone(), submission);
        }
    }
    latest.into_values().collect()
}

/// Score descending, then duration ascending. Name and id only fix the
/// order of rows that share a rank.
fn leaderboard_order(a: &Submission, b: &Submission) -> Ordering {
    b.total_score
        .cmp(&a.total_score)
        .then(a.duration_seconds.cmp(&b.duration_seconds))
        .then_with(|| a.participant_name.cmp(&b.participant_name))
        .then(a.id.cmp(&b.id))
}

/// Latest attempt per participant, in leaderboard order.
pub fn latest_sorted(history: Vec<Submission>) -> Vec<Submission> {
    let mut latest = latest_per_participant(history);
    latest.sort_by(leaderboard_order);
    latest
}

#[derive(Debug, Default)]
struct RankCursor {
    last: Option<(i32, i32)>,
    current_rank: u32,
    position: u32,
    rows: Vec<RankedEntry>,
}

impl RankCursor {
    fn advance(mut self, s: &Submission) -> Self {
        self.position += 1;
        let key = (s.total_score, s.duration_seconds);
        if self.last != Some(key) {
            self.current_rank = self.position;
            self.last = Some(key);
        }
        self.rows.push(RankedEntry {
            name: s.participant_name.clone(),
            score: s.total_score,
            duration_seconds: s.duration_seconds,
            rank: self.current_rank,
        });
        self
    }
}

/// Assigns competition ranks to an already sorted sequence.
pub fn assign_ranks(sorted: &[Submission]) -> Vec<RankedEntry> {
    sorted
        .iter()
        .fold(RankCursor::default(), RankCursor::advance)
        .rows
}

/// Full pipeline: dedupe, sort, rank.
pub fn rank_submissions(history: Vec<Submission>) -> Vec<RankedEntry> {
    assign_ranks(&latest_sorted(history))
}

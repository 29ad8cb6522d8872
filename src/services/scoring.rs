// src/services/scoring.rs

use std::collections::HashMap;

use crate::models::{quiz::Question, submission::AnswerDto};

/// Percentage above which a performance award gets the 10% bonus.
pub const BONUS_THRESHOLD: f64 = 0.9;
pub const BONUS_MULTIPLIER: f64 = 1.10;
pub const MAX_PERFORMANCE_XP: f64 = 110.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreCard {
    pub total_questions: i32,
    pub total_correct: i32,
    pub total_score: i32,
}

/// Folds the submitted answer list into `question id -> selected letter`.
/// Items missing either field are ignored; a later answer for the same
/// question replaces an earlier one.
pub fn answers_from_request(answers: &[AnswerDto]) -> HashMap<i64, String> {
    answers
        .iter()
        .filter_map(|a| Some((a.question_id?, a.selected.clone()?)))
        .collect()
}

/// Scores an attempt.
///
/// * A question counts as correct when its selected option equals the
///   correct one, ignoring case.
/// * Each correct question adds its marks (1 when unset).
/// * Unknown question ids and unanswered questions earn nothing.
pub fn score(questions: &[Question], answers: &HashMap<i64, String>) -> ScoreCard {
    questions.iter().fold(
        ScoreCard {
            total_questions: questions.len() as i32,
            ..ScoreCard::default()
        },
        |mut card, q| {
            let correct = match (answers.get(&q.id), q.correct_answer.as_deref()) {
                (Some(selected), Some(expected)) => {
                    selected.to_lowercase() == expected.to_lowercase()
                }
                _ => false,
            };
            if correct {
                card.total_correct += 1;
                card.total_score = card.total_score.saturating_add(q.marks.unwrap_or(1));
            }
            card
        },
    )
}

/// Share of correctly answered questions; 0 for an empty quiz.
pub fn performance_percent(total_correct: i32, total_questions: i32) -> f64 {
    if total_questions > 0 {
        f64::from(total_correct) / f64::from(total_questions)
    } else {
        0.0
    }
}

/// XP for a performance award: `percent * 100`, plus 10% above the bonus
/// threshold, capped at 110 and rounded.
pub fn performance_xp(percent: f64) -> i64 {
    let base = percent * 100.0;
    let with_bonus = if percent > BONUS_THRESHOLD {
        base * BONUS_MULTIPLIER
    } else {
        base
    };
    with_bonus.min(MAX_PERFORMANCE_XP).round() as i64
}

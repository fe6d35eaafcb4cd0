//! crates/bubble_words_core/src/history.rs
//!
//! Day-by-day view of a player's scores alongside the words matched that day.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{Difficulty, LearnedWordRecord, ScoreEntry};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayScore {
    pub difficulty: Difficulty,
    pub score: f64,
    pub total_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayHistory {
    pub date: NaiveDate,
    pub scores: Vec<DayScore>,
    pub words: Vec<String>,
}

impl DayHistory {
    pub fn total_score(&self) -> f64 {
        self.scores.iter().map(|s| s.score).sum()
    }
}

/// Groups score entries by day, newest first, attaching that day's learned words.
///
/// Days with learned words but no score are left out.
pub fn daily_history(scores: &[ScoreEntry], words: &[LearnedWordRecord]) -> Vec<DayHistory> {
    let mut days: BTreeMap<NaiveDate, DayHistory> = BTreeMap::new();
    for entry in scores {
        days.entry(entry.date)
            .or_insert_with(|| DayHistory {
                date: entry.date,
                scores: Vec::new(),
                words: Vec::new(),
            })
            .scores
            .push(DayScore {
                difficulty: entry.level,
                score: entry.display_score(),
                total_time: entry.total_time,
            });
    }

    for word in words {
        if let Some(day) = days.get_mut(&word.day()) {
            if !day.words.contains(&word.english) {
                day.words.push(word.english.clone());
            }
        }
    }

    days.into_values().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn score(day: u32, level: Difficulty, stored: i64) -> ScoreEntry {
        ScoreEntry {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 12, day).unwrap(),
            level,
            score: stored,
            total_time: 10.0,
            user_id: None,
        }
    }

    fn learned(day: u32, english: &str) -> LearnedWordRecord {
        LearnedWordRecord {
            id: Uuid::new_v4(),
            english: english.to_string(),
            chinese: String::new(),
            phonetic: None,
            learning_date: Utc.with_ymd_and_hms(2024, 12, day, 8, 0, 0).unwrap(),
            review_count: 1,
            user_id: None,
        }
    }

    #[test]
    fn groups_scores_by_day_with_words() {
        let scores = vec![
            score(2, Difficulty::Normal, 50),
            score(3, Difficulty::Normal, 70),
            score(3, Difficulty::Hard, 100),
        ];
        let words = vec![learned(3, "apple"), learned(3, "apple"), learned(3, "pear"), learned(1, "fig")];

        let history = daily_history(&scores, &words);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 12, 3).unwrap());
        assert_eq!(history[0].total_score(), 17.0);
        assert_eq!(history[0].words, vec!["apple", "pear"]);
        assert_eq!(history[1].scores[0].score, 5.0);
        assert!(history[1].words.is_empty());
    }
}

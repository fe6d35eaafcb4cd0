//! crates/bubble_words_core/src/game.rs
//!
//! The bubble-matching state machine for one player.
//!
//! `GameSession` is synchronous and owns no timers. Operations that the client
//! animates over time (a match settling, the continue buttons appearing) hand back
//! a ticket; the owner waits out the delay and redeems it. Every ticket carries the
//! session generation it was issued under, so a ticket that outlives a reset or a
//! new game is ignored.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use crate::domain::{BubbleId, BubbleSide, Difficulty, MatchedPair, Phase, WordLevel, WordPair};

/// Number of word pairs on the board in one round.
pub const ROUND_SIZE: usize = 5;

/// Points awarded for one match.
pub fn match_points(difficulty: Difficulty, phase: Phase) -> u32 {
    match (difficulty, phase) {
        (Difficulty::Hard, Phase::FirstRound) => 10,
        (Difficulty::Hard, _) => 15,
        (Difficulty::Normal, Phase::FirstRound) => 5,
        (Difficulty::Normal, _) => 7,
    }
}

//=========================================================================================
// Bubbles, Tickets and Outcomes
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleStatus {
    Idle,
    Selected,
    /// Part of a match that has not settled yet; no longer tappable.
    Matched,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bubble {
    pub id: BubbleId,
    pub label: String,
    pub status: BubbleStatus,
}

impl Bubble {
    fn is_live(&self) -> bool {
        self.status != BubbleStatus::Matched
    }
}

/// Redeemed after the settle delay to remove a matched word from the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleTicket {
    generation: u64,
    word_id: String,
}

impl SettleTicket {
    pub fn word_id(&self) -> &str {
        &self.word_id
    }
}

/// Redeemed after the completion animation to offer the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinueTicket {
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct MatchResolution {
    pub pair: MatchedPair,
    pub word: WordPair,
    pub points: u32,
    pub ticket: SettleTicket,
}

#[derive(Debug, Clone)]
pub enum TapOutcome {
    /// Unknown or already matched bubble, or nothing left to play.
    Ignored,
    Selected(BubbleId),
    Deselected(BubbleId),
    Matched(MatchResolution),
}

/// What a finished round produced, ready to be written to the score ledger.
#[derive(Debug, Clone)]
pub struct RoundSummary {
    /// The phase that just finished.
    pub phase: Phase,
    pub difficulty: Difficulty,
    pub score: f64,
    pub elapsed: Duration,
    /// True when no further phase follows.
    pub is_final: bool,
    pub continue_ticket: ContinueTicket,
}

#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// The ticket belongs to an earlier game or was already redeemed.
    Stale,
    Removed { word_id: String },
    RoundComplete { word_id: String, summary: RoundSummary },
}

//=========================================================================================
// GameSession
//=========================================================================================

#[derive(Debug)]
pub struct GameSession {
    level: WordLevel,
    difficulty: Difficulty,
    phase: Phase,
    current_words: Vec<WordPair>,
    /// Snapshot of the round's words, replayed by the listening pass.
    saved_words: Vec<WordPair>,
    bubbles: BTreeMap<BubbleId, Bubble>,
    selected: Option<BubbleId>,
    matched_pair: Option<MatchedPair>,
    round_score: f64,
    score: f64,
    showing_completion: bool,
    continue_options: bool,
    game_completed: bool,
    generation: u64,
    started_at: Option<Instant>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(Difficulty::Normal)
    }
}

impl GameSession {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            level: WordLevel::Basic,
            difficulty,
            phase: Phase::FirstRound,
            current_words: Vec::new(),
            saved_words: Vec::new(),
            bubbles: BTreeMap::new(),
            selected: None,
            matched_pair: None,
            round_score: 0.0,
            score: 0.0,
            showing_completion: false,
            continue_options: false,
            game_completed: false,
            generation: 0,
            started_at: None,
        }
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    /// Starts a first round at `level`, drawing up to `ROUND_SIZE` words from `pool`.
    ///
    /// Larger pools are sampled without replacement; smaller ones are used whole.
    /// Words sharing an id with an earlier word are dropped so every pair owns
    /// exactly one bubble per side.
    pub fn start_new_game<R: Rng + ?Sized>(
        &mut self,
        level: WordLevel,
        pool: Vec<WordPair>,
        rng: &mut R,
    ) -> &[WordPair] {
        self.clear_transient();
        self.level = level;
        self.phase = Phase::FirstRound;

        let mut seen = HashSet::new();
        let mut words: Vec<WordPair> = pool
            .into_iter()
            .filter(|w| seen.insert(w.id.clone()))
            .collect();
        if words.len() > ROUND_SIZE {
            words.shuffle(rng);
            words.truncate(ROUND_SIZE);
        }

        self.saved_words = words.clone();
        self.load_words(words);
        &self.current_words
    }

    /// Replays the round's words as a listening pass.
    ///
    /// Only valid once the first round has been completed.
    pub fn continue_to_listening(&mut self) -> bool {
        if self.phase != Phase::FirstRound || !self.showing_completion || self.saved_words.is_empty() {
            return false;
        }
        self.clear_transient();
        self.phase = Phase::Listening;
        let words = self.saved_words.clone();
        self.load_words(words);
        true
    }

    /// Handles a tap on a bubble.
    pub fn select_bubble(&mut self, id: &BubbleId) -> TapOutcome {
        if self.phase == Phase::Completed || !self.is_live(id) {
            return TapOutcome::Ignored;
        }

        match self.selected.clone() {
            Some(current) if current == *id => {
                self.set_selection(None);
                TapOutcome::Deselected(current)
            }
            Some(current) if self.is_live(&current) && current.matches(id) => {
                TapOutcome::Matched(self.resolve_match(current, id.clone()))
            }
            _ => {
                self.set_selection(Some(id.clone()));
                TapOutcome::Selected(id.clone())
            }
        }
    }

    fn resolve_match(&mut self, first: BubbleId, second: BubbleId) -> MatchResolution {
        let points = match_points(self.difficulty, self.phase);
        self.round_score += f64::from(points);

        for id in [&first, &second] {
            if let Some(bubble) = self.bubbles.get_mut(id) {
                bubble.status = BubbleStatus::Matched;
            }
        }

        let word = self
            .current_words
            .iter()
            .find(|w| w.id == first.word_id)
            .cloned()
            .unwrap_or_else(|| WordPair::new(first.word_id.clone(), "", ""));

        let pair = MatchedPair {
            first_id: first,
            second_id: second,
        };
        self.matched_pair = Some(pair.clone());

        MatchResolution {
            ticket: SettleTicket {
                generation: self.generation,
                word_id: word.id.clone(),
            },
            pair,
            word,
            points,
        }
    }

    /// Removes a matched word once its animation has played out.
    pub fn settle_match(&mut self, ticket: &SettleTicket) -> SettleOutcome {
        if ticket.generation != self.generation {
            return SettleOutcome::Stale;
        }
        let Some(index) = self.current_words.iter().position(|w| w.id == ticket.word_id) else {
            return SettleOutcome::Stale;
        };

        let word = self.current_words.remove(index);
        self.bubbles.retain(|id, _| id.word_id != word.id);
        if self
            .matched_pair
            .as_ref()
            .is_some_and(|pair| pair.first_id.word_id == word.id)
        {
            self.matched_pair = None;
        }
        if self.selected.as_ref().is_some_and(|id| id.word_id == word.id) {
            self.selected = None;
        }

        if self.current_words.is_empty() {
            let summary = self.complete_round();
            SettleOutcome::RoundComplete {
                word_id: word.id,
                summary,
            }
        } else {
            SettleOutcome::Removed { word_id: word.id }
        }
    }

    fn complete_round(&mut self) -> RoundSummary {
        let finished_phase = self.phase;
        let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();

        self.score = self.round_score;
        self.round_score = 0.0;
        self.showing_completion = true;
        if finished_phase == Phase::Listening {
            self.phase = Phase::Completed;
            self.game_completed = true;
        }

        RoundSummary {
            phase: finished_phase,
            difficulty: self.difficulty,
            score: self.score,
            elapsed,
            is_final: self.game_completed,
            continue_ticket: ContinueTicket {
                generation: self.generation,
            },
        }
    }

    /// Exposes the continue options after the completion animation.
    pub fn reveal_continue_options(&mut self, ticket: ContinueTicket) -> bool {
        if ticket.generation != self.generation || !self.showing_completion {
            return false;
        }
        self.continue_options = true;
        true
    }

    /// Returns the session to its initial state and invalidates outstanding tickets.
    pub fn reset(&mut self) {
        self.clear_transient();
        self.level = WordLevel::Basic;
        self.phase = Phase::FirstRound;
        self.current_words.clear();
        self.saved_words.clear();
        self.bubbles.clear();
    }

    fn clear_transient(&mut self) {
        self.generation += 1;
        self.selected = None;
        self.matched_pair = None;
        self.round_score = 0.0;
        self.score = 0.0;
        self.showing_completion = false;
        self.continue_options = false;
        self.game_completed = false;
        self.started_at = None;
    }

    fn load_words(&mut self, words: Vec<WordPair>) {
        self.bubbles = words
            .iter()
            .flat_map(|w| {
                [
                    (BubbleSide::English, w.english.clone()),
                    (BubbleSide::Chinese, w.chinese.clone()),
                ]
                .into_iter()
                .map(|(side, label)| {
                    let id = BubbleId::new(w.id.clone(), side);
                    (
                        id.clone(),
                        Bubble {
                            id,
                            label,
                            status: BubbleStatus::Idle,
                        },
                    )
                })
            })
            .collect();
        self.current_words = words;
        self.started_at = Some(Instant::now());
    }

    fn set_selection(&mut self, id: Option<BubbleId>) {
        if let Some(previous) = self.selected.take() {
            if let Some(bubble) = self.bubbles.get_mut(&previous) {
                if bubble.status == BubbleStatus::Selected {
                    bubble.status = BubbleStatus::Idle;
                }
            }
        }
        if let Some(id) = &id {
            if let Some(bubble) = self.bubbles.get_mut(id) {
                bubble.status = BubbleStatus::Selected;
            }
        }
        self.selected = id;
    }

    fn is_live(&self, id: &BubbleId) -> bool {
        self.bubbles.get(id).is_some_and(Bubble::is_live)
    }

    // --- Accessors ---

    pub fn level(&self) -> WordLevel {
        self.level
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_words(&self) -> &[WordPair] {
        &self.current_words
    }

    pub fn bubbles(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.values()
    }

    pub fn bubble(&self, id: &BubbleId) -> Option<&Bubble> {
        self.bubbles.get(id)
    }

    pub fn word(&self, word_id: &str) -> Option<&WordPair> {
        self.current_words.iter().find(|w| w.id == word_id)
    }

    pub fn selected_bubble(&self) -> Option<&BubbleId> {
        self.selected.as_ref()
    }

    pub fn is_bubble_selected(&self, id: &BubbleId) -> bool {
        self.selected.as_ref() == Some(id)
    }

    pub fn matched_pair(&self) -> Option<&MatchedPair> {
        self.matched_pair.as_ref()
    }

    pub fn round_score(&self) -> f64 {
        self.round_score
    }

    /// The score shown to the player once a round has finished.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn is_showing_completion(&self) -> bool {
        self.showing_completion
    }

    pub fn shows_continue_options(&self) -> bool {
        self.continue_options
    }

    pub fn is_game_completed(&self) -> bool {
        self.game_completed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

//! Question sequencing and answer grading for one playthrough.
//!
//! [`GameSession`] knows nothing about sockets or the roster beyond the
//! list of live connection ids it is handed. Given the same session and
//! the same answer it always makes the same decision; randomness is only
//! drawn for shuffles and jokers, from an rng the caller supplies.

use std::collections::{HashMap, HashSet};

use quizhall_protocol::{
    ConnectionId, DeckId, GameMode, GameOverReason, Question, QuestionId,
    QuestionView,
};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::{RiskFloor, RoomError};

/// What the room should do after an answer (or a departure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Someone still has to answer.
    Wait,
    /// Everyone answered; move to the next question.
    Advance,
    /// Everyone answered the last question of an endless game; reshuffle
    /// and start over.
    Wrap,
    /// The game is over.
    End(GameOverReason),
}

/// The result of grading one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graded {
    pub correct: bool,
    pub correct_option_index: usize,
    /// The player's score after this answer.
    pub score: i64,
    pub decision: Decision,
}

/// Question sequence, scores and per-round answer tracking.
#[derive(Debug, Clone)]
pub struct GameSession {
    deck: DeckId,
    mode: GameMode,
    questions: Vec<Question>,
    index: usize,
    /// Holds an entry for every player who answered at least once.
    scores: HashMap<ConnectionId, i64>,
    answered: HashSet<ConnectionId>,
    jokers_used: HashSet<ConnectionId>,
    risk_floor: RiskFloor,
}

impl GameSession {
    /// Starts a session over `questions`, shuffled once with `rng`.
    ///
    /// # Errors
    /// [`RoomError::InsufficientQuestions`] if `questions` is empty.
    pub fn new(
        deck: DeckId,
        mode: GameMode,
        mut questions: Vec<Question>,
        risk_floor: RiskFloor,
        rng: &mut impl Rng,
    ) -> Result<Self, RoomError> {
        if questions.is_empty() {
            return Err(RoomError::InsufficientQuestions(deck));
        }
        questions.shuffle(rng);
        Ok(Self {
            deck,
            mode,
            questions,
            index: 0,
            scores: HashMap::new(),
            answered: HashSet::new(),
            jokers_used: HashSet::new(),
            risk_floor,
        })
    }

    pub fn deck(&self) -> &DeckId {
        &self.deck
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn current(&self) -> &Question {
        // `new` rejects empty sequences and `index` never passes the end.
        &self.questions[self.index]
    }

    pub fn current_view(&self) -> QuestionView {
        self.current().view()
    }

    pub fn score_of(&self, player: ConnectionId) -> Option<i64> {
        self.scores.get(&player).copied()
    }

    pub fn has_answered(&self, player: ConnectionId) -> bool {
        self.answered.contains(&player)
    }

    /// Grades `answer_index` for the current question.
    ///
    /// `live` is the set of players currently in the room; the round is
    /// complete once all of them have answered.
    ///
    /// # Errors
    /// - [`RoomError::StaleQuestionReference`] if `question_id` is not the
    ///   current question.
    /// - [`RoomError::DuplicateAnswer`] if `player` already answered it.
    ///
    /// Neither error touches scores or the answered set.
    pub fn grade(
        &mut self,
        player: ConnectionId,
        question_id: &QuestionId,
        answer_index: usize,
        risk: bool,
        live: &[ConnectionId],
    ) -> Result<Graded, RoomError> {
        self.check_current(question_id)?;
        if self.answered.contains(&player) {
            return Err(RoomError::DuplicateAnswer);
        }

        let question = self.current();
        let correct = question.is_correct(answer_index);
        let correct_option_index = question.correct_option_index;

        let delta = points(self.mode, correct, risk);
        let floor = self.risk_floor;
        let entry = self.scores.entry(player).or_insert(0);
        *entry += delta;
        if delta < 0 {
            *entry = floor.apply(*entry);
        }
        let score = *entry;
        self.answered.insert(player);

        let decision = if self.mode == GameMode::Survival && !correct {
            Decision::End(GameOverReason::SurvivalMiss)
        } else {
            self.round_decision(live)
        };

        Ok(Graded {
            correct,
            correct_option_index,
            score,
            decision,
        })
    }

    /// Decides whether the current round is complete for `live`.
    pub fn round_decision(&self, live: &[ConnectionId]) -> Decision {
        if live.is_empty() || !live.iter().all(|p| self.answered.contains(p)) {
            return Decision::Wait;
        }
        if self.index + 1 < self.questions.len() {
            Decision::Advance
        } else if self.mode == GameMode::Endless {
            Decision::Wrap
        } else {
            Decision::End(GameOverReason::Exhausted)
        }
    }

    /// Moves to the next question, reshuffling first when wrapping, and
    /// clears the answered set. Returns the new current question.
    pub fn advance(&mut self, rng: &mut impl Rng) -> QuestionView {
        self.answered.clear();
        if self.index + 1 < self.questions.len() {
            self.index += 1;
        } else {
            self.questions.shuffle(rng);
            self.index = 0;
        }
        self.current_view()
    }

    /// Plays the fifty-fifty joker: picks two wrong options to hide.
    ///
    /// # Errors
    /// - [`RoomError::StaleQuestionReference`] for a non-current question.
    /// - [`RoomError::DuplicateAnswer`] if the player already answered.
    /// - [`RoomError::JokerAlreadyUsed`] on a second use in this game.
    pub fn use_joker(
        &mut self,
        player: ConnectionId,
        question_id: &QuestionId,
        rng: &mut impl Rng,
    ) -> Result<Vec<usize>, RoomError> {
        self.check_current(question_id)?;
        if self.answered.contains(&player) {
            return Err(RoomError::DuplicateAnswer);
        }
        if self.jokers_used.contains(&player) {
            return Err(RoomError::JokerAlreadyUsed);
        }

        let correct = self.current().correct_option_index;
        let wrong: Vec<usize> = (0..4).filter(|&i| i != correct).collect();
        let mut removed: Vec<usize> = wrong.choose_multiple(rng, 2).copied().collect();
        removed.sort_unstable();

        self.jokers_used.insert(player);
        Ok(removed)
    }

    fn check_current(&self, question_id: &QuestionId) -> Result<(), RoomError> {
        if self.current().id == *question_id {
            Ok(())
        } else {
            Err(RoomError::StaleQuestionReference)
        }
    }
}

/// Score change for one answer under `mode`.
pub fn points(mode: GameMode, correct: bool, risk: bool) -> i64 {
    match (mode, correct) {
        (GameMode::Risk, true) if risk => 2,
        (GameMode::Risk, false) => -1,
        (_, true) => 1,
        (_, false) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn q(id: &str, correct: usize) -> Question {
        Question {
            id: id.into(),
            text: format!("question {id}"),
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option_index: correct,
        }
    }

    fn cid(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn session(mode: GameMode, n: usize, floor: RiskFloor) -> GameSession {
        let questions = (0..n).map(|i| q(&format!("q{i}"), 1)).collect();
        let mut rng = StdRng::seed_from_u64(1);
        GameSession::new("D1".into(), mode, questions, floor, &mut rng).unwrap()
    }

    fn current_id(s: &GameSession) -> QuestionId {
        s.current().id.clone()
    }

    #[test]
    fn test_points_table() {
        for mode in [
            GameMode::Classic,
            GameMode::Shuffle,
            GameMode::TimeAttack,
            GameMode::Speed,
            GameMode::Survival,
            GameMode::Endless,
        ] {
            assert_eq!(points(mode, true, false), 1, "{mode}");
            assert_eq!(points(mode, true, true), 1, "{mode} ignores risk");
            assert_eq!(points(mode, false, false), 0, "{mode}");
        }
        assert_eq!(points(GameMode::Risk, true, true), 2);
        assert_eq!(points(GameMode::Risk, true, false), 1);
        assert_eq!(points(GameMode::Risk, false, true), -1);
        assert_eq!(points(GameMode::Risk, false, false), -1);
    }

    #[test]
    fn test_empty_deck_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = GameSession::new(
            "D0".into(),
            GameMode::Classic,
            Vec::new(),
            RiskFloor::Zero,
            &mut rng,
        );
        assert!(matches!(result, Err(RoomError::InsufficientQuestions(_))));
    }

    #[test]
    fn test_shuffle_is_deterministic_for_a_seed() {
        let questions: Vec<_> = (0..10).map(|i| q(&format!("q{i}"), 0)).collect();
        let order = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let s = GameSession::new(
                "D1".into(),
                GameMode::Shuffle,
                questions.clone(),
                RiskFloor::Zero,
                &mut rng,
            )
            .unwrap();
            s.questions.iter().map(|q| q.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(order(42), order(42));
        let mut sorted = order(42);
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let mut expected: Vec<_> = questions.iter().map(|q| q.id.clone()).collect();
        expected.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(sorted, expected, "shuffle must be a permutation");
    }

    #[test]
    fn test_waits_until_every_live_player_answered() {
        let mut s = session(GameMode::Classic, 3, RiskFloor::Zero);
        let live = [cid(1), cid(2)];
        let id = current_id(&s);

        let first = s.grade(cid(1), &id, 1, false, &live).unwrap();
        assert_eq!(first.decision, Decision::Wait);
        assert!(first.correct);
        assert_eq!(first.score, 1);

        let second = s.grade(cid(2), &id, 0, false, &live).unwrap();
        assert_eq!(second.decision, Decision::Advance);
        assert!(!second.correct);
        assert_eq!(second.score, 0);
        assert_eq!(s.score_of(cid(2)), Some(0));
    }

    #[test]
    fn test_stale_question_is_a_noop() {
        let mut s = session(GameMode::Classic, 3, RiskFloor::Zero);
        let result = s.grade(cid(1), &"not-current".into(), 1, false, &[cid(1)]);
        assert!(matches!(result, Err(RoomError::StaleQuestionReference)));
        assert_eq!(s.score_of(cid(1)), None);
        assert!(!s.has_answered(cid(1)));
    }

    #[test]
    fn test_duplicate_answer_is_a_noop() {
        let mut s = session(GameMode::Classic, 3, RiskFloor::Zero);
        let live = [cid(1), cid(2)];
        let id = current_id(&s);
        s.grade(cid(1), &id, 1, false, &live).unwrap();
        let again = s.grade(cid(1), &id, 1, false, &live);
        assert!(matches!(again, Err(RoomError::DuplicateAnswer)));
        assert_eq!(s.score_of(cid(1)), Some(1));
    }

    #[test]
    fn test_last_question_ends_game() {
        let mut s = session(GameMode::Classic, 1, RiskFloor::Zero);
        let id = current_id(&s);
        let graded = s.grade(cid(1), &id, 1, false, &[cid(1)]).unwrap();
        assert_eq!(graded.decision, Decision::End(GameOverReason::Exhausted));
    }

    #[test]
    fn test_endless_wraps_and_reshuffles() {
        let mut s = session(GameMode::Endless, 2, RiskFloor::Zero);
        let mut rng = StdRng::seed_from_u64(9);
        let live = [cid(1)];

        let id = current_id(&s);
        assert_eq!(
            s.grade(cid(1), &id, 1, false, &live).unwrap().decision,
            Decision::Advance
        );
        s.advance(&mut rng);
        assert_eq!(s.index(), 1);

        let id = current_id(&s);
        assert_eq!(
            s.grade(cid(1), &id, 1, false, &live).unwrap().decision,
            Decision::Wrap
        );
        s.advance(&mut rng);
        assert_eq!(s.index(), 0);
        assert!(!s.has_answered(cid(1)));
        assert_eq!(s.score_of(cid(1)), Some(2));
    }

    #[test]
    fn test_survival_miss_ends_immediately() {
        let mut s = session(GameMode::Survival, 5, RiskFloor::Zero);
        let live = [cid(1), cid(2), cid(3)];
        let id = current_id(&s);
        let graded = s.grade(cid(1), &id, 3, false, &live).unwrap();
        assert_eq!(
            graded.decision,
            Decision::End(GameOverReason::SurvivalMiss)
        );
    }

    #[test]
    fn test_risk_with_zero_floor() {
        let mut s = session(GameMode::Risk, 5, RiskFloor::Zero);
        let mut rng = StdRng::seed_from_u64(3);
        let live = [cid(1)];

        let id = current_id(&s);
        assert_eq!(s.grade(cid(1), &id, 0, true, &live).unwrap().score, 0);
        s.advance(&mut rng);

        let id = current_id(&s);
        assert_eq!(s.grade(cid(1), &id, 1, true, &live).unwrap().score, 2);
        s.advance(&mut rng);

        let id = current_id(&s);
        assert_eq!(s.grade(cid(1), &id, 1, false, &live).unwrap().score, 3);
        s.advance(&mut rng);

        let id = current_id(&s);
        assert_eq!(s.grade(cid(1), &id, 2, false, &live).unwrap().score, 2);
    }

    #[test]
    fn test_risk_unbounded_goes_negative() {
        let mut s = session(GameMode::Risk, 3, RiskFloor::Unbounded);
        let mut rng = StdRng::seed_from_u64(3);
        let live = [cid(1)];

        let id = current_id(&s);
        assert_eq!(s.grade(cid(1), &id, 0, true, &live).unwrap().score, -1);
        s.advance(&mut rng);
        let id = current_id(&s);
        assert_eq!(s.grade(cid(1), &id, 3, false, &live).unwrap().score, -2);
    }

    #[test]
    fn test_departed_player_does_not_block_round() {
        let mut s = session(GameMode::Classic, 3, RiskFloor::Zero);
        let id = current_id(&s);
        s.grade(cid(1), &id, 1, false, &[cid(1), cid(2)]).unwrap();
        assert_eq!(s.round_decision(&[cid(1), cid(2)]), Decision::Wait);
        assert_eq!(s.round_decision(&[cid(1)]), Decision::Advance);
        assert_eq!(s.round_decision(&[]), Decision::Wait);
    }

    #[test]
    fn test_joker_removes_two_wrong_options_once() {
        let mut s = session(GameMode::Classic, 3, RiskFloor::Zero);
        let mut rng = StdRng::seed_from_u64(5);
        let id = current_id(&s);

        let removed = s.use_joker(cid(1), &id, &mut rng).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!removed.contains(&s.current().correct_option_index));
        assert!(removed[0] < removed[1]);

        let again = s.use_joker(cid(1), &id, &mut rng);
        assert!(matches!(again, Err(RoomError::JokerAlreadyUsed)));

        s.grade(cid(1), &id, 1, false, &[cid(1), cid(2)]).unwrap();
        s.grade(cid(2), &id, 1, false, &[cid(1), cid(2)]).unwrap();
        s.advance(&mut rng);
        let next = current_id(&s);
        assert!(matches!(
            s.use_joker(cid(1), &next, &mut rng),
            Err(RoomError::JokerAlreadyUsed)
        ));
    }

    #[test]
    fn test_joker_on_stale_question() {
        let mut s = session(GameMode::Classic, 3, RiskFloor::Zero);
        let mut rng = StdRng::seed_from_u64(5);
        let result = s.use_joker(cid(1), &"old".into(), &mut rng);
        assert!(matches!(result, Err(RoomError::StaleQuestionReference)));
    }
}

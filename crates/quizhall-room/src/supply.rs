//! Collaborators a room talks to: where questions come from and where
//! final scores go.
//!
//! Both are traits so the server can be wired to a real database while
//! tests and the demo use the in-memory versions below.

use std::collections::{HashMap, HashSet};

use quizhall_protocol::{DeckId, Question};
use quizhall_session::Identity;
use tokio::sync::Mutex;

use crate::{ScoreError, SupplyError};

/// Fetches the questions of a deck.
pub trait QuestionSupply: Send + Sync + 'static {
    /// Returns up to `limit` questions from `deck`, in store order.
    ///
    /// An existing deck with no questions yields an empty vector; the room
    /// turns that into `InsufficientQuestions`.
    fn fetch_questions(
        &self,
        deck: &DeckId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Question>, SupplyError>> + Send;
}

/// Persists final scores.
///
/// Stores keep one score per (player, deck) pair and reject a second
/// one with [`ScoreError::AlreadyRecorded`]. Rooms report the rejection
/// and do not retry.
pub trait ScoreStore: Send + Sync + 'static {
    fn record_score(
        &self,
        identity: &Identity,
        deck: &DeckId,
        score: i64,
    ) -> impl std::future::Future<Output = Result<(), ScoreError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Decks held in a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuestionSupply {
    decks: HashMap<DeckId, Vec<Question>>,
}

impl InMemoryQuestionSupply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deck(mut self, deck: impl Into<DeckId>, questions: Vec<Question>) -> Self {
        self.insert_deck(deck.into(), questions);
        self
    }

    pub fn insert_deck(&mut self, deck: DeckId, questions: Vec<Question>) {
        self.decks.insert(deck, questions);
    }

    pub fn deck_ids(&self) -> Vec<DeckId> {
        self.decks.keys().cloned().collect()
    }
}

impl QuestionSupply for InMemoryQuestionSupply {
    async fn fetch_questions(
        &self,
        deck: &DeckId,
        limit: usize,
    ) -> Result<Vec<Question>, SupplyError> {
        let questions = self
            .decks
            .get(deck)
            .ok_or_else(|| SupplyError::DeckNotFound(deck.clone()))?;
        Ok(questions.iter().take(limit).cloned().collect())
    }
}

/// One persisted score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRecord {
    pub user_id: String,
    pub display_name: String,
    pub deck: DeckId,
    pub score: i64,
}

/// Scores kept in memory, one per (user, deck).
#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    inner: Mutex<ScoreTable>,
}

#[derive(Debug, Default)]
struct ScoreTable {
    seen: HashSet<(String, DeckId)>,
    records: Vec<ScoreRecord>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every score recorded so far, oldest first.
    pub async fn records(&self) -> Vec<ScoreRecord> {
        self.inner.lock().await.records.clone()
    }
}

impl ScoreStore for InMemoryScoreStore {
    async fn record_score(
        &self,
        identity: &Identity,
        deck: &DeckId,
        score: i64,
    ) -> Result<(), ScoreError> {
        let user_id = identity
            .user_id
            .clone()
            .ok_or_else(|| ScoreError::Unavailable("guests have no score history".into()))?;

        let mut table = self.inner.lock().await;
        if !table.seen.insert((user_id.clone(), deck.clone())) {
            return Err(ScoreError::AlreadyRecorded {
                user_id,
                deck: deck.clone(),
            });
        }
        table.records.push(ScoreRecord {
            user_id,
            display_name: identity.display_name.clone(),
            deck: deck.clone(),
            score,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str) -> Question {
        Question {
            id: id.into(),
            text: format!("question {id}"),
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option_index: 0,
        }
    }

    #[tokio::test]
    async fn test_fetch_respects_limit_and_order() {
        let supply = InMemoryQuestionSupply::new().with_deck(
            "D1",
            vec![question("1"), question("2"), question("3")],
        );
        let got = supply.fetch_questions(&"D1".into(), 2).await.unwrap();
        let ids: Vec<_> = got.iter().map(|q| q.id.0.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[tokio::test]
    async fn test_fetch_unknown_deck() {
        let supply = InMemoryQuestionSupply::new();
        let result = supply.fetch_questions(&"nope".into(), 10).await;
        assert!(matches!(result, Err(SupplyError::DeckNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_deck_yields_no_questions() {
        let supply = InMemoryQuestionSupply::new().with_deck("empty", Vec::new());
        let got = supply.fetch_questions(&"empty".into(), 10).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_score_store_rejects_second_save_for_same_pair() {
        let store = InMemoryScoreStore::new();
        let ada = Identity::user("ada", "Ada");
        let d1: DeckId = "D1".into();

        store.record_score(&ada, &d1, 4).await.unwrap();
        let second = store.record_score(&ada, &d1, 9).await;
        assert!(matches!(second, Err(ScoreError::AlreadyRecorded { .. })));

        store.record_score(&ada, &"D2".into(), 1).await.unwrap();
        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].score, 4);
    }

    #[tokio::test]
    async fn test_score_store_refuses_guests() {
        let store = InMemoryScoreStore::new();
        let guest = Identity {
            display_name: "Guest_1".into(),
            user_id: None,
        };
        let result = store.record_score(&guest, &"D1".into(), 3).await;
        assert!(matches!(result, Err(ScoreError::Unavailable(_))));
        assert!(store.records().await.is_empty());
    }
}

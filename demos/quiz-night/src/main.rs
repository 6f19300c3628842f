//! A quiz night server with a couple of built-in decks.
//!
//! Environment:
//! - `QUIZHALL_BIND`: listen address, default `0.0.0.0:8080`
//! - `QUIZHALL_DECKS`: optional path to a JSON object mapping deck ids to
//!   question lists; its decks are added to (or replace) the built-in ones
//! - `RUST_LOG`: log filter, default `info`

use std::collections::HashMap;
use std::sync::Arc;

use quizhall::prelude::*;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

fn question(id: &str, text: &str, options: [&str; 4], correct: usize) -> Question {
    Question {
        id: id.into(),
        text: text.into(),
        options: options.map(String::from),
        correct_option_index: correct,
    }
}

/// The decks every server starts with.
fn builtin_decks() -> HashMap<DeckId, Vec<Question>> {
    let capitals = vec![
        question("cap-1", "Capital of France?", ["Paris", "Lyon", "Nice", "Lille"], 0),
        question("cap-2", "Capital of Japan?", ["Osaka", "Kyoto", "Tokyo", "Nagoya"], 2),
        question("cap-3", "Capital of Canada?", ["Toronto", "Ottawa", "Montreal", "Vancouver"], 1),
        question("cap-4", "Capital of Australia?", ["Sydney", "Perth", "Melbourne", "Canberra"], 3),
        question("cap-5", "Capital of Kenya?", ["Nairobi", "Mombasa", "Kisumu", "Nakuru"], 0),
    ];
    let science = vec![
        question("sci-1", "Chemical symbol for gold?", ["Ag", "Au", "Gd", "Go"], 1),
        question("sci-2", "Planet closest to the sun?", ["Venus", "Mars", "Mercury", "Earth"], 2),
        question("sci-3", "Water boils at sea level at?", ["90 °C", "100 °C", "110 °C", "120 °C"], 1),
        question("sci-4", "How many legs does a spider have?", ["6", "8", "10", "12"], 1),
    ];
    HashMap::from([("capitals".into(), capitals), ("science".into(), science)])
}

/// Parses a deck file. Questions whose correct index does not point at
/// one of the four options are dropped with a warning.
fn parse_decks(json: &str) -> Result<HashMap<DeckId, Vec<Question>>, serde_json::Error> {
    let mut decks: HashMap<DeckId, Vec<Question>> = serde_json::from_str(json)?;
    for (deck, questions) in &mut decks {
        questions.retain(|q| {
            let valid = q.correct_option_index < q.options.len();
            if !valid {
                tracing::warn!(%deck, question = %q.id, "dropping question with invalid answer index");
            }
            valid
        });
    }
    Ok(decks)
}

fn load_supply() -> Result<InMemoryQuestionSupply, Box<dyn std::error::Error>> {
    let mut decks = builtin_decks();
    if let Ok(path) = std::env::var("QUIZHALL_DECKS") {
        let json = std::fs::read_to_string(&path)?;
        let extra = parse_decks(&json)?;
        tracing::info!(%path, decks = extra.len(), "loaded deck file");
        decks.extend(extra);
    }

    let mut supply = InMemoryQuestionSupply::new();
    for (deck, questions) in decks {
        supply.insert_deck(deck, questions);
    }
    Ok(supply)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    quizhall::init_tracing();

    let bind = std::env::var("QUIZHALL_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let supply = load_supply()?;
    tracing::info!(%bind, decks = ?supply.deck_ids(), "starting quiz night");

    let server = QuizhallServerBuilder::new()
        .bind(&bind)
        .build(
            GuestAuthenticator,
            Arc::new(supply),
            Arc::new(InMemoryScoreStore::new()),
        )
        .await?;

    server.run().await?;
    Ok(())
}

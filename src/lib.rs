//! CdB_ Quizz · gamified hospitality trivia backend.
//!
//! The quiz core (card gestures, deck, session state machine, progression
//! model) is pure and lives next to the service that exposes it:
//! REST endpoints for question generation, finished attempts, profiles and
//! pronunciation help, plus a WebSocket that runs a live session.

pub mod audio;
pub mod card;
pub mod client;
pub mod config;
pub mod deck;
pub mod domain;
pub mod driver;
pub mod duel;
pub mod gemini;
pub mod leaderboard;
pub mod profile;
pub mod protocol;
pub mod routes;
pub mod seeds;
pub mod session;
pub mod source;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod timer;
pub mod util;

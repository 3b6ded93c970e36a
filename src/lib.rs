//! Guard Ranker
//!
//! Ranks candidate guard relays for a circuit from partial evidence (exit
//! relay, bandwidth, setup time). Training builds a checksummed artifact
//! bundle; the prediction service loads it and answers top-K queries.

pub mod api;
pub mod config;
pub mod constants;
pub mod logic;

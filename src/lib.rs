//! Match-sync and coaching service for League of Legends players:
//! polls the Riot API for new matches, derives per-match performance
//! metrics, generates rule-based and LLM-backed coaching, and announces
//! reports to Discord channels.

pub mod coach;
pub mod config;
pub mod context;
pub mod db;
pub mod discord;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod riot;
pub mod scheduler;
pub mod summary;
pub mod sync;

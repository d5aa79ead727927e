//! Outreach bot: role-aware recruiting conversations and reach-out
//! orchestration over messaging channels.

pub mod artifacts;
pub mod bot;
pub mod cache;
pub mod channels;
pub mod classifier;
pub mod config;
pub mod error;
pub mod llm;
pub mod outreach;
pub mod store;

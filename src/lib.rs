//! # Refine
//!
//! A terminal life-improvement coach backed by Gemini.
//!
//! ## Features
//!
//! - **Guided coaching**: a five-step flow from current friction to one small, reversible action
//! - **Live summary**: a structured record of the conversation, refreshed in the background
//! - **Session scoped**: the conversation lives only as long as the signed-in session

pub mod agent;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod logging;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod summary;
pub mod ui;

pub use config::Config;
pub use conversation::{Message, Role};
pub use orchestrator::Orchestrator;
pub use summary::SummaryRecord;

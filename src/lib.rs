// Library crate for integration tests.
// main.rs drives these modules through the CLI.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod feedback;
pub mod observability;
pub mod retry;

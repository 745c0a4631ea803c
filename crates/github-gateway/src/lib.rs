//! GitHub Gateway: REST adapter for Policy Bots
//!
//! Implements [`policy_bots_core::RepositoryGateway`] on top of the GitHub
//! REST API (reqwest + rustls), and [`policy_bots_core::ContentFetcher`] for
//! canonical policy sources.
//!
//! Every request is raced against the run context, so cancellation and
//! deadlines interrupt in-flight HTTP calls.

pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
mod models;

pub use client::GitHubClient;
pub use config::{GitHubConfig, DEFAULT_API_URL};
pub use error::{GitHubError, Result};
pub use fetch::HttpContentFetcher;

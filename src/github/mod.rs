// GitHub API module.
// Provides the GraphQL client and contribution queries.

pub mod client;
pub mod contributions;
pub mod types;

pub use client::GitHubClient;

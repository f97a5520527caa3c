//! Linear workspace integration: a GraphQL client over the remote API and
//! the agent system that exposes it as a set of tools.
pub mod client;
pub mod system;

//! Slack adapter: Web API client, RTM event stream and process wiring.

pub mod client;
pub mod events;
pub mod rtm;
pub mod runtime;

pub use client::SlackClient;

//! Client engine for a chat-driven code-generation workspace.
//!
//! One chat = one socket ([`transport`]) whose frames are classified by
//! [`codec`] and folded into a [`store::SessionStore`]; [`selection`] derives
//! what the panes render and [`ledger`] keeps per-file version history.

pub mod codec;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod selection;
pub mod service;
pub mod store;
pub mod transport;

#[cfg(feature = "native")]
pub mod api;
#[cfg(feature = "native")]
pub mod cli;
#[cfg(feature = "native")]
pub mod config;

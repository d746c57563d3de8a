//! feedshard: fetches syndication feeds, optionally extracts the full text
//! of every linked article, and writes the result as a sharded JSON
//! snapshot for static front-ends.
//!
//! A run has two phases:
//!
//! - **Phase A** fetches and parses every configured feed concurrently
//!   ([`scheduler::fetch_all`]).
//! - **Phase B** feeds every item with a link through a fixed pool of
//!   extraction workers ([`scheduler::extract_all`]).
//!
//! The output is assembled by [`output::Snapshot`] and written atomically by
//! [`output::write_snapshot`].

pub mod config;
pub mod content;
pub mod feed;
pub mod model;
pub mod output;
pub mod scheduler;
pub mod util;

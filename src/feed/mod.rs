//! Feed retrieval and parsing.
//!
//! - [`fetcher`] - HTTP fetching with manual redirects, charset decoding and
//!   a single-retry wrapper
//! - [`xml`] - generic element tree built from quick-xml events
//! - [`parser`] - typed RSS 2.0 / Atom / RDF decode into [`ParsedItem`]s
//!
//! [`ParsedItem`]: crate::model::ParsedItem

pub mod fetcher;
pub mod parser;
pub mod xml;

pub use fetcher::{Charset, FetchError, FetchSettings, Fetcher, Probe, RawDocument};
pub use parser::{parse_feed, ParseError};

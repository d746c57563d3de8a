//! Utility functions shared by the pipeline stages.
//!
//! - **URL handling**: scheme validation, `Location` resolution, host matching
//! - **Text processing**: HTML entity decoding, slugification, whitespace
//!
//! # Examples
//!
//! ```
//! use feedshard::util::{decode_entities, slugify, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! assert_eq!(decode_entities("Q&amp;A"), "Q&A");
//! assert_eq!(slugify("World News"), "world-news");
//! ```

mod text;
mod url_validator;

pub use text::{collapse_whitespace, decode_entities, slugify};
pub use url_validator::{host_matches, resolve_against, validate_url, UrlValidationError};

//! Full-text article extraction.
//!
//! Given an article URL, [`ContentExtractor`] fetches the page and reduces
//! it to either sanitized HTML or cleaned plain text:
//!
//! 1. aggregator links are unwrapped to the publisher URL
//! 2. consent walls are rejected ([`consent`])
//! 3. page chrome is stripped and the main content scored ([`readability`])
//! 4. the winner is sanitized ([`sanitize`]), or its text cleaned
//!    ([`cleaner`]) when too little markup survives

pub mod cleaner;
pub mod consent;
mod extractor;
pub mod readability;
pub mod sanitize;

pub use cleaner::clean_text;
pub use extractor::{
    process_page, ContentExtractor, ExtractError, ExtractorSettings, AGGREGATOR_DOMAINS,
    RESOLVER_USER_AGENT,
};

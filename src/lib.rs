mod connect;
pub use connect::connect;

pub mod backend;
pub mod error;
pub mod job;
pub mod key_encoder;
pub mod parse_status;
pub mod store;
pub mod types;
pub mod utils;
pub mod webpage;

pub use error::CrawlError;
pub use key_encoder::{
    reverse_host, reverse_url, reverse_url_str, reversed_host, unreverse_url, Locator, ReversedKey,
};
pub use store::{PageQuery, WebPageStore};
pub use webpage::{WebPage, WebPageField};

#[cfg(test)]
mod proptest_tests;

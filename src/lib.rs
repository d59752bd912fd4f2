//! Client-side cache for a Chat-BI dataset collection.
//!
//! [`store::DatasetStore`] keeps an ordered mirror of the server's datasets,
//! serves it while fresh, and coalesces concurrent fetches into a single
//! retrieval from a [`source::DatasetSource`].

pub mod app;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod observer;
pub mod output;
pub mod poller;
pub mod source;
pub mod store;

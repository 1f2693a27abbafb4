//! # cartsync-cdp
//!
//! Remote side of the sync: a Chrome DevTools Protocol client attached to the
//! shopping list page, and the adapter that turns list operations into page
//! scripts.
//!
//! - [`RemoteClient`]: discovery, attach, evaluation, bounded reconnection
//! - [`PageListAdapter`]: `read_items` / `add_item` / `remove_item`
//! - [`SelectorStrategy`]: replaceable page scripts ([`AmazonListSelectors`])
//! - [`RemoteError`]: error taxonomy with propagation tiers

#![deny(unsafe_code)]

pub mod adapter;
pub mod client;
pub mod discovery;
pub mod error;
pub mod selectors;
pub mod session;
pub mod traits;

pub use adapter::PageListAdapter;
pub use client::RemoteClient;
pub use error::{ErrorTier, RemoteError};
pub use selectors::{AmazonListSelectors, PageItem, PageSelectors, ScriptReply, SelectorStrategy};
pub use traits::{ListAccess, PageEvaluator, RemoteControl, RemoteList};

//! A normalized, optimistic client-side cache for Mastodon and Pleroma
//! servers.
//!
//! Server payloads are split into per-kind entity tables ([`store`]),
//! ordered lists reference entities by id, and reply links are tracked in
//! a separate thread index ([`thread`]). Writes happen through the cache
//! handle, which broadcasts one [`store::CacheEvent`] per write.
//! [`effects`] layers optimistic mutations with rollback on top, and
//! [`fetch`] and [`poll`] drive paginated loading.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod effects;
pub mod fetch;
pub mod pending;
pub mod poll;
pub mod store;
pub mod thread;

#[cfg(test)]
mod testing;

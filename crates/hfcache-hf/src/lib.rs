//! `HuggingFace` Hub client (C4): repo lookup, file listing, byte-range
//! download, token validation. Stateless over a shared HTTP session; all
//! retry and backoff policy lives in the download coordinator and network
//! failure manager, not here (§4.4).

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]
// `DefaultHfClient` is the only type callers should name; its generic
// backend parameter is an implementation detail.
#![allow(private_interfaces)]

mod client;
mod config;
mod error;
mod http;
mod models;
mod token;
mod url;

pub use client::DefaultHfClient;
pub use config::HfClientConfig;
pub use token::{KeychainAccessor, NoKeychain, TokenSource};

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;

//! Download Coordinator (C6): drives a single repo's download against the
//! hub client and local cache, and implements the single-file redownload
//! trigger the Verification Service (C7) uses for repair (§4.6, §4.7).

#![deny(unused_crate_dependencies)]

mod coordinator;

pub use coordinator::{DownloadCoordinator, DownloadCoordinatorConfig};

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;

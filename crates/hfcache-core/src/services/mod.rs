//! Engine-level services built on top of the ports and concrete components
//! in this crate.

mod verification;

pub use verification::{VerificationOutcome, VerificationService};

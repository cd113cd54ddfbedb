//! Internal utilities: deterministic RNG and the identifier entropy seam.
//!
//! Identifier generation flows through the [`IdSource`] trait so production
//! code draws from OS entropy while tests use a seeded deterministic source.

pub mod det_rng;
pub mod id_source;

pub use det_rng::DetRng;
pub use id_source::{DetIdSource, IdSource, OsIdSource};

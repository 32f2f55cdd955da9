//! HTTP-backed provider implementations.

#[cfg(feature = "cohere")]
pub mod cohere;

#[cfg(feature = "cohere")]
pub use cohere::{CohereClient, CohereConfig};

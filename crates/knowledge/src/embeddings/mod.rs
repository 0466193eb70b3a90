//! Embedding seam.
//!
//! The rest of the crate only sees [`EmbeddingProvider`]; concrete backends
//! live under [`providers`] and are chosen by [`create_provider`].

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};

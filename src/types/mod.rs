//! Data types for the corroboration engine.

pub mod claim;
pub mod config;
pub mod corpus;
pub mod record;

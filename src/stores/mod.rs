//! Corpus store implementations.

pub mod memory;

pub use memory::MemoryCorpus;

//! Concrete implementations of the domain ports.

pub mod cache;
pub mod memory;

pub use cache::CachedRunRepository;
pub use memory::InMemoryRunRepository;

//! Caching decorators for repository ports.

pub mod cached_run_repository;

pub use cached_run_repository::CachedRunRepository;

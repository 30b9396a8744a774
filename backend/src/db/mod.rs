//! Entity store for nights, laser targets, observations and blanket closures.
//!
//! Callers depend on the [`NightRepository`] trait only, so the in-memory
//! [`LocalRepository`] can be swapped for a persistent backend without
//! touching the services.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Services (collector, night monitor, HTTP)   │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │  NightRepository trait                       │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │  LocalRepository (in-memory)                 │
//! └──────────────────────────────────────────────┘
//! ```

pub mod repositories;
pub mod repository;

pub use repositories::LocalRepository;
pub use repository::{Entity, ErrorContext, NightRepository, RepositoryError, RepositoryResult};

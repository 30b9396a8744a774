//! Repository traits and their shared error type.

pub mod error;
pub mod night;

pub use error::{Entity, ErrorContext, RepositoryError, RepositoryResult};
pub use night::NightRepository;

//! Export of generated data.
//!
//! Provides the seed database fixture consumed by the registry API tests.

pub mod seed;

pub use seed::{generate_seed_database, write_seed_database, SeedDatabase};

//! # Sysjob Testing Utils
//!
//! Shared testing utilities for the job scheduling workspace:
//!
//! - **Mock Repositories**: in-memory implementations of the repository ports
//! - **Test Data Builders**: utilities for creating test entities
//!
//! Add this crate as a dev-dependency and pull in what the test needs:
//!
//! ```toml
//! [dev-dependencies]
//! sysjob-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

pub use entities::*;
pub use errors::{SchedulerError, SchedulerResult};
pub use events::*;
pub use repositories::*;
pub use value_objects::*;

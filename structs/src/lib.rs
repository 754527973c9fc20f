pub mod cut;
pub mod instance;
pub mod tour;

pub use cut::{ArcCoef, BendersCut};
pub use instance::{Instance, InstanceError};
pub use tour::{Tour, TourError};

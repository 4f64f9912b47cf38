pub mod matrix;
pub mod neighbors;
pub mod popularity;
pub mod recommendations;
pub mod snapshot;
pub mod training;

pub use recommendations::RecommendationEngine;
pub use snapshot::{ModelHandle, ModelSnapshot};
pub use training::{train_model, Trainer};

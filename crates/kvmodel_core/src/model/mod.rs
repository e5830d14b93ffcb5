//! Entities, model types and the model registry.

mod entity;
mod id;
mod model_type;
mod registry;

pub use entity::{Entity, ReadOptions};
pub use id::ModelId;
pub use model_type::{ModelBuilder, ModelType};
pub use registry::Registry;

//! Layer definitions and the schema registry.

mod layer;
mod registry;

pub use layer::{FeatureDef, LayerDef, LayerKind};
pub use registry::SchemaRegistry;

pub(crate) use registry::endpoint_ranges;

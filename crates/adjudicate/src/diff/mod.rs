//! Position/configuration model and diff computation.

mod compute;
mod configuration;
mod position;
mod state;

pub use compute::{compute_diff, ComparisonMode, DiffResult};
pub use configuration::{Configuration, ConfigurationSet};
pub use position::Position;
pub use state::{annotation_states, AnnotationState};

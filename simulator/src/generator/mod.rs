pub mod airspace;
pub mod plan;
pub mod template;

pub use airspace::build_map_context;
pub use plan::{build_exploration, build_plan, GeneratorConfig};

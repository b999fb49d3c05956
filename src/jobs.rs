pub mod model;
pub mod orchestrator;

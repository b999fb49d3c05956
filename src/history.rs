pub mod repo;
pub mod snapshot;

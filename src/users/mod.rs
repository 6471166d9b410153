pub mod memory;
pub mod query;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validation;

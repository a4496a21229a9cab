pub mod namespace;
pub mod nodes;
pub mod pods;

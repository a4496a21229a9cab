pub mod executor;
pub mod fake;
pub mod remote;

pub use executor::{ContainerRef, ExecError, ExecOutput, Executor};

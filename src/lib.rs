pub mod cgroup;
pub mod cluster;
pub mod config;
pub mod exec;
pub mod quota;
pub mod resources;
pub mod scenario;
pub mod suite;
pub mod verify;
pub mod workload;

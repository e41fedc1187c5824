pub mod config;
pub mod ipc;
pub mod mode;
pub mod remote;
pub mod supervisor;
pub mod utils;

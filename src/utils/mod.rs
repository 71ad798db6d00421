pub mod aggregate;
pub mod command;
pub mod fastx;
pub mod file;
pub mod index;
pub mod partition;
pub mod scheduler;
pub mod shard;
pub mod system;

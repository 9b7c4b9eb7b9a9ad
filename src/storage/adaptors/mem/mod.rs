pub mod mem_config_store;

pub use mem_config_store::*;

mod adaptors;
mod config_store;

pub use adaptors::mem::*;
pub use config_store::*;

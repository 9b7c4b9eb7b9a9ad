mod manager;
mod session;

pub use manager::*;
pub use session::*;

#[cfg(test)]
mod session_test;

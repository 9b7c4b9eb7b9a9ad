pub mod http;
mod listening;

pub use listening::*;

#[cfg(test)]
mod http_test;

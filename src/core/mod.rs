mod archive;
mod batch;
mod bus;
mod digest;
mod event;
mod long_poll;
mod model;
mod resolver;

pub use archive::*;
pub use batch::*;
pub use bus::*;
pub use digest::*;
pub use event::*;
pub use long_poll::*;
pub use model::*;
pub use resolver::*;

#[cfg(test)]
mod archive_test;
#[cfg(test)]
mod bus_test;
#[cfg(test)]
mod digest_test;

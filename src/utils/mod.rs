pub mod async_task;

pub mod net;

pub mod pattern;

pub mod time;

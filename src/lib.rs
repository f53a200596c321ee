pub mod carve;
pub mod cli;
pub mod config;
pub mod constants;
pub mod date;
pub mod device;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod pipeline;
pub mod scanner;
pub mod segment;
pub mod util;

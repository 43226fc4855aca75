pub mod context;
pub mod input;
pub mod monitor;
pub mod output;
pub mod signals;

pub mod clock;
pub mod config;
pub mod parental;
pub mod platform;
pub mod store;

pub mod app;
pub mod checksum;
pub mod config;
pub mod dump;
pub mod error;
pub mod frame;
pub mod gps;
pub mod job;
pub mod locator;
pub mod output;
pub mod progress;
pub mod remote;
pub mod series;
pub mod store;
pub mod transfer;

pub mod app;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod document;
pub mod error;
pub mod identity;
pub mod probe;
pub mod reboot;
pub mod repository;
pub mod util;

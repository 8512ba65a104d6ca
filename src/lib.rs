pub mod apply;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod provision;
pub mod report;
pub mod verify;

#[cfg(test)]
mod testing;

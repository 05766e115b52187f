pub mod catalog;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod session;
pub mod srs;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod testing;

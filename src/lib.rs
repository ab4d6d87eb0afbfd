pub mod auth;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod inbox;
pub mod mail;
pub mod store;
pub mod terminal;

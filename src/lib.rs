pub mod api;
pub mod client;
pub mod config;
pub mod humanize;
pub mod janitor;
pub mod mediatool;
pub mod observability;
pub mod tasks;
pub mod worker;

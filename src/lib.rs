pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dao;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod types;

#[cfg(test)]
pub mod testing;

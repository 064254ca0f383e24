//! Church Registry Backend Library
//!
//! Staff authentication with rotating refresh tokens, and a sacrament
//! registry that keeps each person's lineage of records consistent.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod lineage;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

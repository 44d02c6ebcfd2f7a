//! Patchwright server library
//!
//! A GitHub App that turns labeled issues and review feedback into pull
//! requests written by an external coding agent, and meters that usage
//! against each installation's plan.

pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod workflows;

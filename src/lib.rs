//! foresight: forecast evaluation and simulated trading controller.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in
//! [`ports`], concrete implementations in [`adapters`], orchestration in
//! [`controller`].

pub mod adapters;
pub mod cli;
pub mod controller;
pub mod domain;
pub mod ports;

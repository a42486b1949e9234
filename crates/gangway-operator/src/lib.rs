//! Gangway operator - wiring for the gang-scheduling control plane

#![deny(missing_docs)]

pub mod config;
pub mod controller_runner;

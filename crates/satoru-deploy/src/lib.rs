//! # Satoru Deploy
//!
//! The Satoru protocol's bring-up, expressed as data for
//! [`deploy_orchestrator`]:
//!
//! - [`catalog`]: the eighteen components, their constructors, and the role catalog.
//! - [`config`]: command line and environment settings.
//! - [`app`]: the commands behind the `satoru-deploy` binary.

pub mod app;
pub mod catalog;
pub mod config;

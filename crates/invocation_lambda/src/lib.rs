//! AWS-oriented adapters and the Lambda entry point for invocation wrapping.
//!
//! This crate owns runtime integration details (Secrets Manager, DynamoDB and
//! HTTP collaborators, environment configuration, tracing setup) and exposes a
//! single runtime module boundary that wires them into an
//! [`invocation_core::Executor`].

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod runtime;
pub mod telemetry;

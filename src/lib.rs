//! Turnstile - Request Admission Control
//!
//! This crate implements a per-client fixed-window rate limiter that an HTTP
//! layer consults once per inbound request. Over-limit requests are a normal
//! outcome ([`ratelimit::Decision::Reject`]), carrying the time until the
//! caller may retry.

pub mod admission;
pub mod config;
pub mod error;
pub mod ratelimit;

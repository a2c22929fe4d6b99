//! Utility functions and helpers for bqguard.
//!
//! This module provides cross-cutting concerns like structured logging,
//! token sanitization, and retry logic with backoff.
//!
//! # Submodules
//!
//! - `logging`: Tracing initialization with secret redaction.
//! - `retry`: Caller-side retry for transient remote failures.

pub mod logging;
pub mod retry;

//! Guard rails for the Crewline orchestration core.
//!
//! # Main types
//!
//! - [`RateLimiter`]: Sliding-window limiter used to cap tool calls per
//!   session and tool.
//! - [`Sanitizer`]: Input sanitization and normalization for user messages.

/// Sliding-window rate limiting.
pub mod rate_limit;
/// Input sanitization utilities.
pub mod sanitizer;

pub use rate_limit::RateLimiter;
pub use sanitizer::{SanitizeResult, Sanitizer};

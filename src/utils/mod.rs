//! Utility modules for camhub

pub mod throttle;

pub use throttle::LogThrottler;

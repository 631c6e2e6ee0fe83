//! Utility modules for the agent

pub mod throttle;

pub use throttle::LogThrottler;

pub mod application;
pub mod candidate;
pub mod config;
pub mod cycle;
pub mod queue;

pub mod commands;
pub mod lifecycle;
pub mod payment;
pub mod progress;
pub mod runtime;

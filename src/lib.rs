//! Survey Flow: onboarding survey controller.

pub mod config;
pub mod error;
pub mod remote;
pub mod store;
pub mod survey;

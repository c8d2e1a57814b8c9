//! Core types for the printer farm proxy: configuration, errors, logging,
//! metrics and the device registry seam.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod registry;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{ConnectionDescriptor, DeviceId};
pub use registry::DeviceRegistry;

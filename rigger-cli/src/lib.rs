pub mod config;
pub mod credentials;
pub mod demo;
pub mod fault;
pub mod naming;
pub mod report;

pub use config::{ConfigError, ConfigOverrides, RunConfig};
pub use credentials::{Credentials, CredentialsError};
pub use fault::{FaultError, inject_failure};
pub use naming::Namer;
pub use report::OutputFormat;

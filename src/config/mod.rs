pub mod config_base;
pub mod connection;
pub mod secret;
pub mod settings;

pub use config_base::Config;
pub use connection::{ConnectionDescriptor, ConnectionSection};
pub use secret::Secret;
pub use settings::{Environment, Settings, Source};

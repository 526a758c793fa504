pub mod android;
pub mod config;
pub mod errors;
pub mod hub;
pub mod pool;
pub mod proxy;
pub mod router;
pub mod server;
pub mod session;
pub mod wire;

pub use config::{CliConfig, HubSettings, Inventory};
pub use errors::HubError;
pub use hub::Hub;

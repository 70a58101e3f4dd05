pub use app_error::{AppError, AppResult};
pub use config::{ChatConfig, GeneralConfig, NetworkConfig, Role};
pub use delivery::DeliveryTracker;
pub use handler::{Callbacks, PeerHandler};
pub use manager::ConnectionManager;
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod delivery;
mod handler;
mod manager;
mod peer;
mod shutdown;
mod tracing_config;

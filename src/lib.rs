pub mod message;
pub mod network;
pub mod service;

pub use message::{Message, MessageKind};
pub use network::MessageCodec;
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, Callbacks, ChatConfig,
    ConnectionManager, DeliveryTracker, GeneralConfig, NetworkConfig, PeerHandler, Role,
};

pub use chat_message::{timestamp_from_nanos, timestamp_nanos, Message, MessageKind};
pub mod constants;
mod chat_message;

//! Message transports.

mod channel;
pub mod cli;
mod manager;
pub mod telegram;

pub use channel::{
    Attachment, Channel, IncomingMessage, MessageStream, Outbound, Presence, detect_link,
};
pub use cli::CliChannel;
pub use manager::ChannelManager;
pub use telegram::TelegramChannel;

mod client;

pub use mentor_realtime_types as types;
pub use client::{
    Client, Config, ConfigBuilder, Loopback, MessageSender, SendError, ServerEvent, ServerRx,
    connect, connect_with_config, loopback,
};

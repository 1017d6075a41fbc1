//! Server wire protocol: message shapes and the [`client::ServerClient`]
//! adapter trait.

pub mod client;
pub mod messages;

pub use client::ServerClient;
pub use messages::{
    CancelInteraction, ClientMessage, ErrorResponse, InteractionInput, InteractionInputParams,
    InteractionResponse, ServerMessage, SessionReady,
};

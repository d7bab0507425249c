pub mod auth;
pub mod chats;
pub mod emergency;
pub mod error;
pub mod extract;
pub mod family;
pub mod messages;
pub mod middleware;
pub mod notify;
pub mod pins;
pub mod polls;
pub mod router;
pub mod state;
pub mod views;

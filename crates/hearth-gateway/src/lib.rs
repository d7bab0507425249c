pub mod connection;
pub mod hub;
pub mod presence;

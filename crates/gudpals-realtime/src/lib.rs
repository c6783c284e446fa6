pub mod connection;
pub mod dispatcher;
pub mod media_hub;
pub mod tokens;

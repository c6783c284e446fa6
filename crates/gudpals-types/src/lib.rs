pub mod api;
pub mod events;
pub mod media;
pub mod models;

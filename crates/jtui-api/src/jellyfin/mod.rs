pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::Session;
pub use client::JellyfinClient;
pub use error::JellyfinError;

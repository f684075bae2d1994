pub mod auth;
pub mod error;
pub mod handlers;
pub mod redemption;
pub mod server;
pub mod transcription;

pub use error::ApiError;
pub use server::{start, AppState, ServerConfig, ServerHandle};
pub use transcription::CreditPolicy;

pub mod identity;
pub mod mock;
pub mod payment;
pub mod speech;

pub use identity::{AuthSession, HttpIdentityProvider, IdentityProvider, OAuthProvider};
pub use payment::{PaymentGateway, StripeGateway};
pub use speech::{OpenAiSpeech, SpeechToText, TranscribeOptions};

pub mod secret_codec;
pub mod token;

pub use secret_codec::SecretCodec;
pub use token::{AuthError, AuthUser, TokenVerifier};

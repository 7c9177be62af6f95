/// Security module
/// Session tokens (codec + single-session store) and password hashing
pub mod password;
pub mod token_codec;
pub mod token_store;

pub use password::{Argon2Hasher, PasswordError, PasswordHasher};
pub use token_codec::{Claims, CodecError, TokenCodec};
pub use token_store::{TokenError, TokenStore};

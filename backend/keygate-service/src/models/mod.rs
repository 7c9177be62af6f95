/// Data models for accounts
pub mod user;

pub use user::{NewUser, User, UserProfile};

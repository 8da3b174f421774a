//! Wire models shared with the document backend.
//!
//! - `UserProfile`: the authenticated user's snapshot
//! - `Credentials`, `LoginResponse`, `PasswordChange`: authentication payloads

pub mod user;

pub use user::{Credentials, LoginResponse, PasswordChange, UserProfile};

mod email;
mod store;

pub use email::{email_is_valid, validate_email};
pub use store::{SessionStore, Voter};

use thiserror::Error;

/// Input problems reported straight back to the user. None of these ever
/// reach the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Pick both wall colors, a sofa and a mirror first.")]
    IncompleteApartment,

    #[error("Log in with your email first.")]
    NotLoggedIn,

    #[error("{value} is not in the palette.")]
    UnknownColor { value: String },

    #[error("No {kind} at index {index}; choose 1-{available}.")]
    UnknownChoice {
        kind: &'static str,
        index: usize,
        available: usize,
    },
}

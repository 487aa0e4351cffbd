use thiserror::Error;

/// Rejections produced when validating identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier is empty")]
    Empty,

    #[error("Identifier {id:?} contains reserved character {reserved:?}")]
    ReservedCharacter { id: String, reserved: char },
}

/// Errors from parsing or validating foundation types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// A generation token was not a positive integer.
    #[error("invalid generation: {0}")]
    InvalidGeneration(String),
}

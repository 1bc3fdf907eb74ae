#[derive(Debug, thiserror::Error)]
pub enum TuiError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid key sequence {0:?}: {1}")]
    KeySequence(String, String),
}

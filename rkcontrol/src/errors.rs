use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    // Pas d'écran, pas d'entrée : on dégrade mais on continue
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
    // Fichier manquant ou corrompu : on saute l'élément
    #[error("Load failure: {0}")]
    LoadFailure(String),
    #[error("Handoff failure: {0}")]
    HandoffFailure(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Pipeline error: {0}")]
    PipelineError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Playlist error: {0}")]
    Playlist(#[from] rkplaylist::Error),
}

impl KioskError {
    pub fn resource_unavailable(message: impl Into<String>) -> Self {
        KioskError::ResourceUnavailable(message.into())
    }

    pub fn load_failure(message: impl Into<String>) -> Self {
        KioskError::LoadFailure(message.into())
    }

    pub fn handoff_failure(message: impl Into<String>) -> Self {
        KioskError::HandoffFailure(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        KioskError::ConfigurationError(message.into())
    }

    pub fn pipeline(message: impl Into<String>) -> Self {
        KioskError::PipelineError(message.into())
    }

    /// Failures that only concern the current item; the playlist goes on.
    pub fn is_item_failure(&self) -> bool {
        matches!(
            self,
            KioskError::LoadFailure(_)
                | KioskError::ConfigurationError(_)
                | KioskError::PipelineError(_)
                | KioskError::Playlist(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KioskError>;

use thiserror::Error;

/// Failure taxonomy for stage operations. None of these are fatal to the
/// process; each is contained to the operation that raised it.
#[derive(Debug, Error)]
pub enum StageError {
    /// Asset fetch or parse failed. Recovered locally: logged, loading
    /// flag cleared, stage shows no model.
    #[error("failed to load model from {url}: {source}")]
    LoadFailure {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    /// Audio decode or hardware playback failed. The owning speech task
    /// resolves as if it completed so the queue keeps advancing.
    #[error("audio playback failed: {0}")]
    PlaybackFailure(String),
    /// An operation needed a model while nothing was attached.
    #[error("no active model attached")]
    NoActiveModel,
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one stage is required")]
    NoStages,

    #[error("Stage profile has zero total duration")]
    EmptyProfile,

    #[error("Invalid stage `{0}`; expected `<duration>:<target>` (e.g. `30s:5`)")]
    InvalidStage(String),

    #[error("Invalid stage duration: {0}")]
    InvalidDuration(#[from] humantime::DurationError),

    #[error("Population must have at least one team and one member per team")]
    EmptyPopulation,

    #[error("Error rate threshold must be within [0, 1], got {0}")]
    InvalidErrorRate(f64),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Operation weights must be positive and sum to 1, got {0}")]
    InvalidWeights(f64),
}

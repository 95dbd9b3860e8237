pub mod analysis;
pub mod candidates;
pub mod enzyme;
pub mod fdr;
pub mod fit;
pub mod frequency;
pub mod histogram;
pub mod ion_series;
pub mod localization;
pub mod mass;
pub mod ml;
pub mod modification;
pub mod parameters;
pub mod psm;
pub mod spectrum;

#[derive(Debug)]
pub enum Error {
    Config(parameters::ConfigError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<parameters::ConfigError> for Error {
    fn from(e: parameters::ConfigError) -> Self {
        Self::Config(e)
    }
}

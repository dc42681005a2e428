use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} = {value} out of range, expected {min}..={max}")]
    OutOfRange { field: &'static str, value: i64, min: i64, max: i64 },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unrecognized fields in {section}: {keys:?}")]
    UnknownKeys { section: String, keys: Vec<String> },

    #[error("unrecognized config_version: {found}, expect {expected}")]
    VersionMismatch { found: String, expected: &'static str },

    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Returns Err(OutOfRange) unless min <= value <= max
    pub fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> Result<(), ConfigError>
    where
        T: PartialOrd + Into<i64> + Copy,
    {
        if value < min || value > max {
            return Err(ConfigError::OutOfRange {
                field,
                value: value.into(),
                min: min.into(),
                max: max.into(),
            });
        }
        Ok(())
    }
}

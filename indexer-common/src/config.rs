//! Value types shared by the `Envconfig` structs of both binaries.
use std::str::FromStr;
use std::time;

/// A duration read from the environment as a number of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// A string that must be set to something, used for values like secrets and queue names
/// where an empty value would silently break the pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keeps secrets out of logs when a config is debug-printed.
impl std::fmt::Debug for NonEmptyString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NonEmptyString(<{} chars>)", self.0.len())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

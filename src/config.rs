use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, ConfigError>;

const DEFAULT_MAX_PROCESS_COUNT: usize = 100;
const DEFAULT_RECONFIGURE_RETRIES: u32 = 64;

/// Upper bound on dequeue iterations for one mixing run.
///
/// Counts dequeue operations, not distinct inputs: an input that bounces
/// through three mixers before becoming terminal consumes three.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxProcessCount(usize);

impl MaxProcessCount {
    pub fn new(value: usize) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for MaxProcessCount {
    fn default() -> Self {
        Self(DEFAULT_MAX_PROCESS_COUNT)
    }
}

impl TryFrom<String> for MaxProcessCount {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        let count = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber {
                var_name: "RULEMIX_MAX_PROCESS_COUNT".to_string(),
                value: value.clone(),
            })?;

        Self::new(count).ok_or_else(|| ConfigError::MustBePositive {
            var_name: "RULEMIX_MAX_PROCESS_COUNT".to_string(),
        })
    }
}

impl AsRef<usize> for MaxProcessCount {
    fn as_ref(&self) -> &usize {
        &self.0
    }
}

/// Number of compare-and-retry attempts a hot reconfiguration makes before
/// giving up on a configuration that keeps changing underneath it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconfigureRetries(u32);

impl ReconfigureRetries {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for ReconfigureRetries {
    fn default() -> Self {
        Self(DEFAULT_RECONFIGURE_RETRIES)
    }
}

impl TryFrom<String> for ReconfigureRetries {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        let retries = value
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber {
                var_name: "RULEMIX_RECONFIGURE_RETRIES".to_string(),
                value: value.clone(),
            })?;

        if retries == 0 {
            return Err(ConfigError::MustBePositive {
                var_name: "RULEMIX_RECONFIGURE_RETRIES".to_string(),
            });
        }

        Ok(Self(retries))
    }
}

/// Driver policy for one mixing pipeline.
///
/// Carried by pipeline configuration nodes, so a hot reconfiguration of the
/// tree can change the policy along with the mixers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixingSettings {
    #[serde(alias = "max_mix_count")]
    pub max_process_count: MaxProcessCount,
    /// Stop the whole run at the first rejection or flagged process error.
    pub fail_on_first_error: bool,
    /// Re-enqueue non-terminal outputs. When disabled they are recorded as
    /// rejected instead.
    pub remix_output: bool,
}

impl Default for MixingSettings {
    fn default() -> Self {
        Self {
            max_process_count: MaxProcessCount::default(),
            fail_on_first_error: false,
            remix_output: true,
        }
    }
}

impl MixingSettings {
    pub fn with_max_process_count(mut self, max_process_count: usize) -> Self {
        if let Some(value) = MaxProcessCount::new(max_process_count) {
            self.max_process_count = value;
        }
        self
    }

    pub fn fail_on_first_error(mut self, enabled: bool) -> Self {
        self.fail_on_first_error = enabled;
        self
    }

    pub fn remix_output(mut self, enabled: bool) -> Self {
        self.remix_output = enabled;
        self
    }
}

/// Process-wide defaults, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub mixing: MixingSettings,
    /// Open one monitor group per evaluated node.
    pub trace_evaluation: bool,
    /// Substitute a value instead of rethrowing when an evaluator fails.
    pub swallow_errors: bool,
    pub reconfigure_retries: ReconfigureRetries,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: version(),
            mixing: MixingSettings::default(),
            trace_evaluation: false,
            swallow_errors: false,
            reconfigure_retries: ReconfigureRetries::default(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        let max_process_count: MaxProcessCount = default_env(
            "RULEMIX_MAX_PROCESS_COUNT",
            &DEFAULT_MAX_PROCESS_COUNT.to_string(),
        )
        .try_into()?;
        let fail_on_first_error = parse_bool_env("RULEMIX_FAIL_ON_FIRST_ERROR", false)?;
        let remix_output = parse_bool_env("RULEMIX_REMIX_OUTPUT", true)?;
        let trace_evaluation = parse_bool_env("RULEMIX_TRACE_EVALUATION", false)?;
        let swallow_errors = parse_bool_env("RULEMIX_SWALLOW_ERRORS", false)?;
        let reconfigure_retries: ReconfigureRetries = default_env(
            "RULEMIX_RECONFIGURE_RETRIES",
            &DEFAULT_RECONFIGURE_RETRIES.to_string(),
        )
        .try_into()?;

        Ok(Self {
            version: version(),
            mixing: MixingSettings {
                max_process_count,
                fail_on_first_error,
                remix_output,
            },
            trace_evaluation,
            swallow_errors,
            reconfigure_retries,
        })
    }

    /// Alias for [`Config::new`].
    pub fn from_env() -> Result<Self> {
        Self::new()
    }
}

/// Retrieves an environment variable with a default value if not set.
fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or(default_value.to_string())
}

fn parse_bool_env(name: &str, default_value: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => parse_bool(name, &value),
        Err(_) => Ok(default_value),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            var_name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Retrieves the crate version from compile-time environment variables.
pub fn version() -> String {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .unwrap_or("unknown")
        .to_string()
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error-rulemix-config-1 Invalid number for {var_name}: {value}")]
    InvalidNumber { var_name: String, value: String },

    #[error("error-rulemix-config-2 Invalid boolean for {var_name}: {value}")]
    InvalidBoolean { var_name: String, value: String },

    #[error("error-rulemix-config-3 Value must be greater than 0: {var_name}")]
    MustBePositive { var_name: String },
}

/// Errors raised while evaluating a compiled evaluator.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("error-rulemix-engine-1 Asynchronous evaluator invoked synchronously: {path}")]
    AsyncInSyncContext { path: String },

    #[error("error-rulemix-engine-2 Transform produced a null value: {path}")]
    NullTransformResult { path: String },

    #[error("error-rulemix-engine-3 Hook returned a {actual} outcome where a {expected} was expected")]
    OutcomeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("error-rulemix-engine-4 Unexpected value: expected {expected}, got {actual}")]
    UnexpectedValue {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("error-rulemix-engine-5 Evaluation failed at {path}: {details}")]
    EvaluationFailed { path: String, details: String },
}

/// Errors raised while compiling configuration nodes into evaluators.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("error-rulemix-build-1 Node {path} is a {actual} node, expected {expected}")]
    WrongFamily {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("error-rulemix-build-2 Unknown {family} kind: {kind}")]
    UnknownKind { family: &'static str, kind: String },

    #[error("error-rulemix-build-3 Invalid settings at {path}: {details}")]
    InvalidSettings { path: String, details: String },

    #[error("error-rulemix-build-4 Mixer node {path} compiled to nothing")]
    EmptyMixer { path: String },
}

/// Errors raised while substituting nodes in a live configuration tree.
#[derive(Error, Debug)]
pub enum ReconfigureError {
    #[error("error-rulemix-reconfigure-1 Replacement at {path} is a {actual} node, expected {expected}")]
    FamilyMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("error-rulemix-reconfigure-2 Replacement at {path} failed to build: {source}")]
    BuildFailed {
        path: String,
        #[source]
        source: BuildError,
    },

    #[error("error-rulemix-reconfigure-3 Configuration changed concurrently {attempts} times, giving up")]
    RetriesExhausted { attempts: u32 },

    #[error("error-rulemix-reconfigure-4 Path not found: {path}")]
    PathNotFound { path: String },
}

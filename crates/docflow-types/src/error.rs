use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a failure, used by retry policies to decide
/// which error families are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The inference service rejected or failed the call.
    Inference,
    /// The operation did not finish before its deadline.
    Timeout,
    /// A response could not be parsed into the expected shape.
    Parse,
    /// A required input was absent from the document or run context.
    MissingInput,
    /// Any other handler failure.
    Handler,
}

impl ErrorClass {
    /// Every class, in declaration order.
    pub const ALL: [ErrorClass; 5] = [
        ErrorClass::Inference,
        ErrorClass::Timeout,
        ErrorClass::Parse,
        ErrorClass::MissingInput,
        ErrorClass::Handler,
    ];
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Inference => write!(f, "inference"),
            ErrorClass::Timeout => write!(f, "timeout"),
            ErrorClass::Parse => write!(f, "parse"),
            ErrorClass::MissingInput => write!(f, "missing_input"),
            ErrorClass::Handler => write!(f, "handler"),
        }
    }
}

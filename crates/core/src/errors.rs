use thiserror::Error;

use crate::domain::submission::SubmissionId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("submission {0} not found")]
    NotFound(SubmissionId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("malformed body: {message}")]
    MalformedBody { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Missing fields",
            Self::NotFound { .. } => "Submission not found",
            Self::MalformedBody { .. } => "Invalid JSON body",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::MalformedBody { correlation_id, .. } => correlation_id,
        }
    }
}

impl SubmissionError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::MalformedBody { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<SubmissionError> for InterfaceError {
    fn from(value: SubmissionError) -> Self {
        let message = value.to_string();
        match value {
            SubmissionError::MissingFields(_) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            SubmissionError::NotFound(_) => {
                Self::NotFound { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::submission::SubmissionId;
    use crate::errors::{InterfaceError, SubmissionError};

    #[test]
    fn missing_fields_maps_to_bad_request_with_correlation_id() {
        let interface =
            SubmissionError::MissingFields(vec!["price"]).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, ref message }
                if correlation_id == "req-1" && message.contains("price")
        ));
        assert_eq!(interface.user_message(), "Missing fields");
    }

    #[test]
    fn not_found_maps_to_not_found_with_static_message() {
        let interface = SubmissionError::NotFound(SubmissionId(42)).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
        assert_eq!(interface.user_message(), "Submission not found");
    }

    #[test]
    fn malformed_body_carries_its_own_user_message() {
        let interface = InterfaceError::MalformedBody {
            message: "EOF while parsing an object".to_owned(),
            correlation_id: "req-3".to_owned(),
        };

        assert_eq!(interface.correlation_id(), "req-3");
        assert_eq!(interface.user_message(), "Invalid JSON body");
    }

    #[test]
    fn missing_fields_message_lists_fields_in_order() {
        let error = SubmissionError::MissingFields(vec!["conversion", "stock"]);
        assert_eq!(error.to_string(), "missing required fields: conversion, stock");
    }
}

//! Library-wide error type.
//!
//! Only failures that block a single action surface here. Parse failures of
//! cell values never do (they count as zero hours) and geocoding failures
//! degrade to fallback values inside the geocoder.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::helpers::{email::MailError, store::StoreError};
use crate::models::hours::SetAllPreview;

#[derive(Error, Debug)]
pub enum TimesheetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown team member: {0}")]
    UnknownMember(String),

    #[error("Unknown day: {0}")]
    UnknownDay(String),

    #[error("Unknown cell choice: {0}")]
    UnknownChoice(String),

    #[error("Invalid coordinates: {lat}, {lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("No hay correo configurado para {0}")]
    MissingRecipient(String),

    #[error("Setting every member for {} requires confirmation", .0.day)]
    ConfirmationRequired(SetAllPreview),

    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Email error: {0}")]
    Mail(#[from] MailError),

    #[error("Render error: {0}")]
    Render(String),
}

pub type TimesheetResult<T> = Result<T, TimesheetError>;

impl IntoResponse for TimesheetError {
    fn into_response(self) -> Response {
        let status = match &self {
            TimesheetError::UnknownMember(_) | TimesheetError::UnknownDay(_) => {
                StatusCode::NOT_FOUND
            }
            TimesheetError::UnknownChoice(_)
            | TimesheetError::InvalidCoordinates { .. }
            | TimesheetError::MissingRecipient(_) => StatusCode::BAD_REQUEST,
            TimesheetError::ConfirmationRequired(_) => StatusCode::PRECONDITION_REQUIRED,
            TimesheetError::ExportInProgress => StatusCode::CONFLICT,
            TimesheetError::Store(_) | TimesheetError::Mail(_) => StatusCode::BAD_GATEWAY,
            TimesheetError::Config(_) | TimesheetError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match &self {
            TimesheetError::ConfirmationRequired(preview) => json!({
                "error": self.to_string(),
                "preview": preview,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

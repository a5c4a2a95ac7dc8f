//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid association path for {model}.{association}: {path}")]
    InvalidAssociationPath {
        model: String,
        association: String,
        path: String,
    },
    #[error("duplicate field name: {0}")]
    DuplicateField(String),
    #[error("more than one lookup field: {0:?}")]
    MultipleLookupFields(Vec<String>),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Errors reported by a storage collaborator.
///
/// `EmptyResult` and `NoRowsDeleted` are control signals the actions translate
/// into not-found responses; they never leave an action as-is.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("EmptyResponse")]
    EmptyResult,
    #[error("No Rows Deleted")]
    NoRowsDeleted,
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("unknown association {association} on {model}")]
    UnknownAssociation { model: String, association: String },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

/// Required fields absent from an action's input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissingFields {
    pub required: Vec<String>,
    pub required_or: Vec<String>,
}

impl MissingFields {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.required_or.is_empty()
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for MissingFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let required = match self.required.as_slice() {
            [] => None,
            [one] => Some(format!("\"{}\"", one)),
            many => Some(format!("all of => ({})", quoted_list(many))),
        };
        let required_or = if self.required_or.is_empty() {
            None
        } else {
            Some(format!("at least one of => ({})", quoted_list(&self.required_or)))
        };
        match (required, required_or) {
            (Some(r), None) if self.required.len() == 1 => write!(f, "Missing required field: {}", r),
            (Some(r), None) => write!(f, "Missing required fields: {}", r),
            (None, Some(o)) => write!(f, "Missing required fields: {}", o),
            (Some(r), Some(o)) => write!(f, "Missing required fields: {} AND {}", r, o),
            (None, None) => write!(f, "Missing required fields"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("The model \"{0}\" is not recognized")]
    ModelNotRecognized(String),
    #[error("Missing required association properties: {}", quoted_list(.0))]
    InvalidAssociationProperties(Vec<String>),
    #[error("{0}")]
    MissingFields(MissingFields),
    #[error("A lookup field was not provided")]
    LookupFieldNotProvided,
    #[error("You are not authorized to perform this action")]
    NotAuthorized,
    #[error("The requested \"{0}\" was not found")]
    ResourceNotFound(String),
    #[error("The requested \"{0}\" association does not exist")]
    AssociationDoesNotExist(String),
    #[error("{0}")]
    ThirdParty(String),
    #[error("invalid resource spec: {0}")]
    InvalidSpec(#[from] ConfigError),
}

pub type ActionResult<T> = Result<T, ActionError>;

impl ActionError {
    /// Wrap any storage failure that has no dedicated kind, keeping its message.
    pub fn third_party(err: StoreError) -> Self {
        ActionError::ThirdParty(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ActionError::ModelNotRecognized(_)
            | ActionError::InvalidAssociationProperties(_)
            | ActionError::MissingFields(_)
            | ActionError::LookupFieldNotProvided
            | ActionError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
            ActionError::NotAuthorized => StatusCode::FORBIDDEN,
            ActionError::ResourceNotFound(_) | ActionError::AssociationDoesNotExist(_) => {
                StatusCode::NOT_FOUND
            }
            ActionError::ThirdParty(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ActionError::ModelNotRecognized(_) => "ModelNotRecognized",
            ActionError::InvalidAssociationProperties(_) => "InvalidAssociationProperties",
            ActionError::MissingFields(_) => "MissingFields",
            ActionError::LookupFieldNotProvided => "LookupFieldNotProvided",
            ActionError::NotAuthorized => "NotAuthorized",
            ActionError::ResourceNotFound(_) => "ResourceNotFound",
            ActionError::AssociationDoesNotExist(_) => "AssociationDoesNotExist",
            ActionError::ThirdParty(_) => "ThirdParty",
            ActionError::InvalidSpec(_) => "InvalidSpec",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ActionError::MissingFields(missing) => Some(serde_json::json!({
                "required": missing.required,
                "requiredOr": missing.required_or,
            })),
            ActionError::InvalidAssociationProperties(props) => Some(serde_json::json!(props)),
            _ => None,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&ActionError> for ErrorBody {
    fn from(err: &ActionError) -> Self {
        ErrorBody {
            error: ErrorDetail {
                code: err.code().to_string(),
                message: err.to_string(),
                details: err.details(),
            },
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self);
        (self.status(), Json(body)).into_response()
    }
}

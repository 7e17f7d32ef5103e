use std::convert::Infallible;

use thiserror::Error;
use tracing::error;
use warp::{
    http::StatusCode,
    reject::{MethodNotAllowed, Reject},
    reply::{self, Reply, Response},
    Rejection,
};

/// Errors that end a request.
///
/// Every failure is terminal for the current request; nothing is retried and
/// no partial page is rendered.
#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("query failed: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Reject for Error {}

/// Turns any rejection into a plain-text reply with the matching status.
pub(crate) async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if let Some(e) = rejection.find::<Error>() {
        if e.status().is_server_error() {
            error!("Problem while handling request. {}", e);
        }
        (e.status(), e.to_string())
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method Not Allowed".to_string(),
        )
    } else if rejection.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rejection);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };
    Ok(reply::with_status(message, status).into_response())
}

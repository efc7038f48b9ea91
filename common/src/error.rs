// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for gangway
//!
//! For HTTP-level error handling, see Dropshot.

use dropshot::HttpError;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::fmt::Display;
use uuid::Uuid;

/// An error that can be generated within a gangway component
///
/// These may be generated while handling a client request or as part of
/// background operation.  When generated as part of an HTTP request, an
/// `Error` will be converted into an HTTP error as one of the last steps in
/// processing the request.  This allows most of the system to remain agnostic
/// to the transport with which the system communicates with clients.
///
/// Where possible, reuse an existing variant rather than inventing a new one
/// to distinguish cases that no programmatic consumer needs to distinguish.
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// An object needed as part of this operation was not found.
    #[error("Object (of type {type_name:?}) not found: {lookup_type:?}")]
    ObjectNotFound { type_name: ResourceType, lookup_type: LookupType },
    /// An object already exists with the specified identifier.
    #[error("Object (of type {type_name:?}) already exists: {object_name}")]
    ObjectAlreadyExists { type_name: ResourceType, object_name: String },
    /// The request was well-formed, but the operation cannot be completed
    /// given the current state of the system.
    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },
    /// Authentication credentials were required but either missing or
    /// invalid.  The HTTP status code is called "Unauthorized", but it's more
    /// accurate to call it "Unauthenticated".
    #[error("Missing or invalid credentials")]
    Unauthenticated { internal_message: String },
    /// The request is not authorized to perform the requested operation.
    #[error("Forbidden")]
    Forbidden,

    /// The system encountered an unhandled operational error.
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
    /// The system (or part of it) is unavailable.
    #[error("Service Unavailable: {internal_message}")]
    ServiceUnavailable { internal_message: String },
    /// The operation is declared but its behavior is not implemented.
    #[error("Not Implemented: {internal_message}")]
    NotImplemented { internal_message: String },
}

/// The type of any resource that an [`Error`] can refer to
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum ResourceType {
    User,
    PermissionRecord,
    Workspace,
    Deployment,
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ResourceType::User => "user",
                ResourceType::PermissionRecord => "permission record",
                ResourceType::Workspace => "workspace",
                ResourceType::Deployment => "deployment",
            }
        )
    }
}

/// Indicates how an object was looked up (for an `ObjectNotFound` error)
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum LookupType {
    /// a specific name was requested
    ByName(String),
    /// a specific id was requested
    ById(Uuid),
    /// a specific id was requested with some composite type
    /// (caller summarizes it)
    ByCompositeId(String),
}

impl LookupType {
    /// Returns an ObjectNotFound error appropriate for the case where this
    /// lookup failed
    pub fn into_not_found(self, type_name: ResourceType) -> Error {
        Error::ObjectNotFound { type_name, lookup_type: self }
    }
}

impl From<Uuid> for LookupType {
    fn from(uuid: Uuid) -> Self {
        LookupType::ById(uuid)
    }
}

impl Error {
    /// Returns whether the error is likely transient and could reasonably be
    /// retried
    pub fn retryable(&self) -> bool {
        match self {
            Error::ServiceUnavailable { .. } => true,

            Error::ObjectNotFound { .. }
            | Error::ObjectAlreadyExists { .. }
            | Error::Unauthenticated { .. }
            | Error::InvalidRequest { .. }
            | Error::Forbidden
            | Error::InternalError { .. }
            | Error::NotImplemented { .. } => false,
        }
    }

    /// Generates an [`Error::ObjectNotFound`] error for a lookup by object id.
    pub fn not_found_by_id(type_name: ResourceType, id: &Uuid) -> Error {
        LookupType::ById(*id).into_not_found(type_name)
    }

    /// Generates an [`Error::InternalError`] error with the specific message
    ///
    /// InternalError should be used for operational conditions that should
    /// not happen but that we cannot reasonably handle at runtime (e.g.,
    /// finding no permission record for a live user).
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError { internal_message: internal_message.to_owned() }
    }

    /// Generates an [`Error::InvalidRequest`] error with the specific message
    ///
    /// This should be used for failures due possibly to invalid client input
    /// or malformed requests.
    pub fn invalid_request(message: &str) -> Error {
        Error::InvalidRequest { message: message.to_owned() }
    }

    /// Generates an [`Error::ServiceUnavailable`] error with the specific
    /// message
    ///
    /// This should be used for transient failures where the caller might be
    /// expected to retry.  Logic errors or other problems indicating that a
    /// retry would not work should probably be an InternalError (if it's a
    /// server problem) or InvalidRequest (if it's a client problem) instead.
    pub fn unavail(message: &str) -> Error {
        Error::ServiceUnavailable { internal_message: message.to_owned() }
    }

    /// Generates an [`Error::NotImplemented`] error with the specific message
    ///
    /// This is reserved for operations whose surface exists but whose
    /// behavior is deliberately left unfinished.
    pub fn not_implemented(internal_message: &str) -> Error {
        Error::NotImplemented { internal_message: internal_message.to_owned() }
    }

    /// Given an [`Error`] with an internal message, return the same error
    /// with `context` prepended to it to provide more context
    ///
    /// If the error has no internal message, then it is returned unchanged.
    pub fn internal_context<C>(self, context: C) -> Error
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Error::ObjectNotFound { .. }
            | Error::ObjectAlreadyExists { .. }
            | Error::InvalidRequest { .. }
            | Error::Forbidden => self,
            Error::Unauthenticated { internal_message } => {
                Error::Unauthenticated {
                    internal_message: format!(
                        "{}: {}",
                        context, internal_message
                    ),
                }
            }
            Error::InternalError { internal_message } => Error::InternalError {
                internal_message: format!("{}: {}", context, internal_message),
            },
            Error::ServiceUnavailable { internal_message } => {
                Error::ServiceUnavailable {
                    internal_message: format!(
                        "{}: {}",
                        context, internal_message
                    ),
                }
            }
            Error::NotImplemented { internal_message } => {
                Error::NotImplemented {
                    internal_message: format!(
                        "{}: {}",
                        context, internal_message
                    ),
                }
            }
        }
    }
}

impl From<Error> for HttpError {
    /// Converts an `Error` error into an `HttpError`.  This defines how
    /// errors that are represented internally using `Error` are ultimately
    /// exposed to clients over HTTP.
    fn from(error: Error) -> HttpError {
        match error {
            Error::ObjectNotFound { type_name: t, lookup_type: lt } => {
                let (lookup_field, lookup_value) = match lt {
                    LookupType::ByName(name) => ("name", name),
                    LookupType::ById(id) => ("id", id.to_string()),
                    LookupType::ByCompositeId(label) => ("id", label),
                };
                let message = format!(
                    "not found: {} with {} \"{}\"",
                    t, lookup_field, lookup_value
                );
                HttpError::for_client_error(
                    Some(String::from("ObjectNotFound")),
                    dropshot::ClientErrorStatusCode::NOT_FOUND,
                    message,
                )
            }

            Error::ObjectAlreadyExists { type_name: t, object_name: n } => {
                let message = format!("already exists: {} \"{}\"", t, n);
                HttpError::for_bad_request(
                    Some(String::from("ObjectAlreadyExists")),
                    message,
                )
            }

            Error::Unauthenticated { internal_message } => HttpError {
                status_code: dropshot::ErrorStatusCode::UNAUTHORIZED,
                // TODO-polish We may want to rethink this error code.  This
                // is what HTTP calls it, but it's confusing.
                error_code: Some(String::from("Unauthorized")),
                external_message: String::from(
                    "credentials missing or invalid",
                ),
                internal_message,
                headers: None,
            },

            Error::InvalidRequest { message } => HttpError::for_bad_request(
                Some(String::from("InvalidRequest")),
                message,
            ),

            Error::Forbidden => HttpError::for_client_error(
                Some(String::from("Forbidden")),
                dropshot::ClientErrorStatusCode::FORBIDDEN,
                String::from("Forbidden"),
            ),

            Error::InternalError { internal_message } => {
                HttpError::for_internal_error(internal_message)
            }

            Error::ServiceUnavailable { internal_message } => {
                HttpError::for_unavail(
                    Some(String::from("ServiceNotAvailable")),
                    internal_message,
                )
            }

            Error::NotImplemented { internal_message } => HttpError {
                status_code: dropshot::ErrorStatusCode::NOT_IMPLEMENTED,
                error_code: Some(String::from("NotImplemented")),
                external_message: String::from("not implemented"),
                internal_message,
                headers: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::internal_error(&e.to_string())
    }
}

/// Like [`assert!`], except that instead of panicking, this function returns
/// an `Err(Error::InternalError)` with an appropriate message if the given
/// condition is not true.
#[macro_export]
macro_rules! bail_unless {
    ($cond:expr $(,)?) => {
        bail_unless!($cond, "failed runtime check: {:?}", stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            Err($crate::Error::internal_error(&format!($($arg)*)))?;
        }
    };
}

/// Implements a pattern similar to [`anyhow::Context`] for providing extra
/// context for internal error messages
///
/// Unlike `anyhow::Context`, this does not add a new Error to the cause
/// chain.  It replaces the given Error with one that has the modified
/// `internal_message`.
///
/// If the given `Error` variant does not have an `internal_message`, then
/// this currently returns an equivalent Error to what was given, without
/// prepending anything to anything.
///
/// ## Example
///
/// ```
/// use gangway_common::Error;
/// use gangway_common::InternalContext;
///
/// let error: Result<(), Error> = Err(Error::internal_error("boom"));
/// assert_eq!(
///     error.internal_context("uh-oh").unwrap_err().to_string(),
///     "Internal Error: uh-oh: boom"
/// );
/// ```
pub trait InternalContext<T> {
    fn internal_context<C>(self, s: C) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static;

    fn with_internal_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> InternalContext<T> for Result<T, Error> {
    fn internal_context<C>(self, context: C) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|error| error.internal_context(context))
    }

    fn with_internal_context<C, F>(self, make_context: F) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| error.internal_context(make_context()))
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use super::InternalContext;
    use super::LookupType;
    use super::ResourceType;
    use dropshot::HttpError;
    use uuid::Uuid;

    #[test]
    fn test_bail_unless() {
        #![allow(clippy::eq_op)]
        let no_bail = || -> Result<(), Error> {
            bail_unless!(1 + 1 == 2, "wrong answer: {}", 3);
            Ok(())
        };
        assert_eq!(Ok(()), no_bail());

        let do_bail = || {
            bail_unless!(1 + 1 == 3);
            Ok(())
        };
        let error = do_bail().unwrap_err();
        let Error::InternalError { internal_message } = &error else {
            panic!("expected internal error, got {:?}", error);
        };
        assert_eq!(
            internal_message,
            "failed runtime check: \"1 + 1 == 3\""
        );

        let do_bail_label_args = || {
            bail_unless!(1 + 1 == 3, "wrong answer: {}", 3);
            Ok(())
        };
        let error = do_bail_label_args().unwrap_err();
        let Error::InternalError { internal_message } = &error else {
            panic!("expected internal error, got {:?}", error);
        };
        assert_eq!(internal_message, "wrong answer: 3");
    }

    #[test]
    fn test_context() {
        // test `internal_context()`
        let error: Result<(), Error> = Err(Error::internal_error("boom"));
        assert_eq!(
            error.internal_context("uh-oh").unwrap_err().to_string(),
            "Internal Error: uh-oh: boom"
        );

        // test `with_internal_context()`
        let error: Result<(), Error> = Err(Error::internal_error("boom"));
        assert_eq!(
            error
                .with_internal_context(|| format!("uh-oh (#{:2})", 2))
                .unwrap_err()
                .to_string(),
            "Internal Error: uh-oh (# 2): boom"
        );

        // variants with no internal message pass through unchanged
        let error: Result<(), Error> = Err(Error::Forbidden);
        assert_eq!(
            error.internal_context("uh-oh").unwrap_err(),
            Error::Forbidden
        );
    }

    #[test]
    fn test_http_mapping() {
        let error = Error::not_found_by_id(
            ResourceType::PermissionRecord,
            &Uuid::nil(),
        );
        let http = HttpError::from(error);
        assert_eq!(http.status_code.as_u16(), 404);
        assert_eq!(
            http.external_message,
            "not found: permission record with id \
             \"00000000-0000-0000-0000-000000000000\""
        );

        // Forbidden is deliberately uniform: no internal detail leaks out.
        let http = HttpError::from(Error::Forbidden);
        assert_eq!(http.status_code.as_u16(), 403);
        assert_eq!(http.external_message, "Forbidden");

        let http = HttpError::from(Error::unavail("backend unreachable"));
        assert_eq!(http.status_code.as_u16(), 503);

        let http = HttpError::from(Error::not_implemented("update rules"));
        assert_eq!(http.status_code.as_u16(), 501);
        assert_eq!(http.external_message, "not implemented");
    }

    #[test]
    fn test_retryable() {
        assert!(Error::unavail("try again").retryable());
        assert!(!Error::Forbidden.retryable());
        assert!(!Error::internal_error("no").retryable());
        assert!(!LookupType::ById(Uuid::nil())
            .into_not_found(ResourceType::Workspace)
            .retryable());
    }
}

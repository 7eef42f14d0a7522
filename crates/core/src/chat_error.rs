// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Chat error values and their classification.
//!
//! A [`ChatError`] is what listeners see through `on_error`. Its numeric code
//! is either one of the client-side [`ErrorCode`]s or a code reported by the
//! server inside an error envelope. [`ChatError::class`] decides how the
//! connection reacts:
//!
//! - [`ErrorClass::Transient`]: parse failures, retried with backoff
//! - [`ErrorClass::Unrecoverable`]: bad credentials or requests, no retry
//! - [`ErrorClass::Network`]: anything else, left to the health monitor

use serde::{Deserialize, Serialize};
use std::fmt;

/// Codes raised by the client itself or understood from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ApiKeyNotFound,
    ValidationError,
    AuthenticationError,
    TokenExpired,
    TokenNotValid,
    TokenDateIncorrect,
    TokenSignatureIncorrect,
    ParserError,
    SocketClosed,
    SocketFailure,
    CantParseConnectionEvent,
    CantParseEvent,
    InvalidToken,
    UndefinedToken,
    UnableToParseSocketEvent,
    NoErrorBody,
}

impl ErrorCode {
    const ALL: [ErrorCode; 16] = [
        ErrorCode::ApiKeyNotFound,
        ErrorCode::ValidationError,
        ErrorCode::AuthenticationError,
        ErrorCode::TokenExpired,
        ErrorCode::TokenNotValid,
        ErrorCode::TokenDateIncorrect,
        ErrorCode::TokenSignatureIncorrect,
        ErrorCode::ParserError,
        ErrorCode::SocketClosed,
        ErrorCode::SocketFailure,
        ErrorCode::CantParseConnectionEvent,
        ErrorCode::CantParseEvent,
        ErrorCode::InvalidToken,
        ErrorCode::UndefinedToken,
        ErrorCode::UnableToParseSocketEvent,
        ErrorCode::NoErrorBody,
    ];

    /// Numeric wire value.
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::ApiKeyNotFound => 2,
            ErrorCode::ValidationError => 4,
            ErrorCode::AuthenticationError => 5,
            ErrorCode::TokenExpired => 40,
            ErrorCode::TokenNotValid => 41,
            ErrorCode::TokenDateIncorrect => 42,
            ErrorCode::TokenSignatureIncorrect => 43,
            ErrorCode::ParserError => 1000,
            ErrorCode::SocketClosed => 1001,
            ErrorCode::SocketFailure => 1002,
            ErrorCode::CantParseConnectionEvent => 1003,
            ErrorCode::CantParseEvent => 1004,
            ErrorCode::InvalidToken => 1005,
            ErrorCode::UndefinedToken => 1006,
            ErrorCode::UnableToParseSocketEvent => 1007,
            ErrorCode::NoErrorBody => 1008,
        }
    }

    /// Looks up a known code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Default human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ApiKeyNotFound => "api key not found",
            ErrorCode::ValidationError => "request validation failed",
            ErrorCode::AuthenticationError => "authentication failed",
            ErrorCode::TokenExpired => "token expired",
            ErrorCode::TokenNotValid => "token not valid",
            ErrorCode::TokenDateIncorrect => "token date incorrect",
            ErrorCode::TokenSignatureIncorrect => "token signature incorrect",
            ErrorCode::ParserError => "unable to parse data",
            ErrorCode::SocketClosed => "server closed connection",
            ErrorCode::SocketFailure => "socket failure",
            ErrorCode::CantParseConnectionEvent => "unable to parse connection event",
            ErrorCode::CantParseEvent => "unable to parse event",
            ErrorCode::InvalidToken => "invalid token",
            ErrorCode::UndefinedToken => "no token defined for the current user",
            ErrorCode::UnableToParseSocketEvent => "socket event payload either invalid or null",
            ErrorCode::NoErrorBody => "no error body",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// How the connection should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Reconnect after a short backoff, bounded by the retry limit.
    Transient,
    /// Disconnect for good until new credentials arrive.
    Unrecoverable,
    /// Leave recovery to the periodic health check.
    Network,
}

/// A chat error reported by the server or raised locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub status_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat error {}: {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ChatError {}

impl ChatError {
    /// Builds an error from a known code with its default description.
    pub fn new(code: ErrorCode) -> Self {
        ChatError {
            code: code.code(),
            message: code.description().to_string(),
            status_code: -1,
            cause: None,
        }
    }

    /// Builds an error from raw server-reported values.
    pub fn from_server(code: i32, message: impl Into<String>, status_code: i32) -> Self {
        ChatError {
            code,
            message: message.into(),
            status_code,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.code()
    }

    pub fn class(&self) -> ErrorClass {
        match self.error_code() {
            Some(
                ErrorCode::ParserError
                | ErrorCode::CantParseConnectionEvent
                | ErrorCode::CantParseEvent
                | ErrorCode::UnableToParseSocketEvent
                | ErrorCode::NoErrorBody,
            ) => ErrorClass::Transient,
            Some(
                ErrorCode::UndefinedToken
                | ErrorCode::InvalidToken
                | ErrorCode::ApiKeyNotFound
                | ErrorCode::ValidationError,
            ) => ErrorClass::Unrecoverable,
            _ => ErrorClass::Network,
        }
    }

    /// True for errors that invalidate the session token.
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self.error_code(),
            Some(
                ErrorCode::AuthenticationError
                    | ErrorCode::TokenExpired
                    | ErrorCode::TokenNotValid
                    | ErrorCode::TokenDateIncorrect
                    | ErrorCode::TokenSignatureIncorrect
                    | ErrorCode::InvalidToken
                    | ErrorCode::UndefinedToken
            )
        )
    }

    /// True when resending the same request cannot succeed.
    ///
    /// Client errors (4xx) are permanent except timeouts and rate limits.
    pub fn is_permanent(&self) -> bool {
        (400..500).contains(&self.status_code) && self.status_code != 408 && self.status_code != 429
    }
}

#[cfg(test)]
#[path = "chat_error_tests.rs"]
mod tests;

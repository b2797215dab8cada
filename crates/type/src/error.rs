// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Stable, exported error codes.
///
/// Every caller-facing operation resolves to exactly one of these; the
/// numeric discriminants are part of the public contract and never reused.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
	Ok = 0,
	/// Invalid argument supplied by the caller.
	InvalArg = 1,
	/// Memory allocation failed.
	NoMemory = 2,
	/// Requested item does not exist.
	NotFound = 3,
	/// Internal engine inconsistency.
	Internal = 4,
	/// Operation is not supported on the target.
	Unsupported = 5,
	/// Data failed schema validation.
	ValidationFailed = 6,
	/// Item to create already exists.
	DataExists = 7,
	/// Item to operate on is missing.
	DataMissing = 8,
	/// Target is locked by another session.
	Locked = 9,
	/// A blocking acquisition expired.
	Timeout = 10,
	/// A subscriber callback returned an error.
	CallbackFailed = 11,
	/// A subscriber asked for the event to be shelved.
	CallbackShelve = 12,
	/// Generic operation failure.
	OperationFailed = 13,
	/// Schema-layer (YANG library) error.
	Schema = 14,
	/// Operating-system level error.
	Sys = 15,
}

impl Display for ErrorCode {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::Ok => f.write_str("OK"),
			ErrorCode::InvalArg => f.write_str("INVAL_ARG"),
			ErrorCode::NoMemory => f.write_str("NOMEM"),
			ErrorCode::NotFound => f.write_str("NOT_FOUND"),
			ErrorCode::Internal => f.write_str("INTERNAL"),
			ErrorCode::Unsupported => f.write_str("UNSUPPORTED"),
			ErrorCode::ValidationFailed => f.write_str("VALIDATION_FAILED"),
			ErrorCode::DataExists => f.write_str("DATA_EXISTS"),
			ErrorCode::DataMissing => f.write_str("DATA_MISSING"),
			ErrorCode::Locked => f.write_str("LOCKED"),
			ErrorCode::Timeout => f.write_str("TIMEOUT"),
			ErrorCode::CallbackFailed => f.write_str("CALLBACK_FAILED"),
			ErrorCode::CallbackShelve => f.write_str("CALLBACK_SHELVE"),
			ErrorCode::OperationFailed => f.write_str("OPERATION_FAILED"),
			ErrorCode::Schema => f.write_str("LY"),
			ErrorCode::Sys => f.write_str("SYS"),
		}
	}
}

/// One structured entry of an error-info list, anchored to a data path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorItem {
	pub path: String,
	pub message: String,
}

impl ErrorItem {
	pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			message: message.into(),
		}
	}
}

/// The error type surfaced by every caller-facing operation.
///
/// Carries one stable code, a human-readable message and an optional list of
/// per-path items (validation failures, subscriber-attached info).
#[derive(Clone, Debug, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Error {
	pub code: ErrorCode,
	pub message: String,
	pub items: Vec<ErrorItem>,
}

impl Error {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			items: Vec::new(),
		}
	}

	pub fn with_items(code: ErrorCode, message: impl Into<String>, items: Vec<ErrorItem>) -> Self {
		Self {
			code,
			message: message.into(),
			items,
		}
	}

	pub fn inval_arg(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::InvalArg, message)
	}

	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::NotFound, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Internal, message)
	}

	pub fn unsupported(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Unsupported, message)
	}

	pub fn data_exists(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::DataExists, message)
	}

	pub fn data_missing(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::DataMissing, message)
	}

	pub fn locked(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Locked, message)
	}

	pub fn timeout(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Timeout, message)
	}

	pub fn callback_failed(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::CallbackFailed, message)
	}

	pub fn operation_failed(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::OperationFailed, message)
	}

	pub fn validation_failed(items: Vec<ErrorItem>) -> Self {
		Self::with_items(ErrorCode::ValidationFailed, "validation failed", items)
	}

	pub fn schema(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Schema, message)
	}

	pub fn sys(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Sys, message)
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::sys(err.to_string())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_code_rendering_is_stable() {
		assert_eq!(ErrorCode::InvalArg.to_string(), "INVAL_ARG");
		assert_eq!(ErrorCode::ValidationFailed.to_string(), "VALIDATION_FAILED");
		assert_eq!(ErrorCode::Schema.to_string(), "LY");
		assert_eq!(ErrorCode::CallbackShelve.to_string(), "CALLBACK_SHELVE");
	}

	#[test]
	fn test_validation_error_carries_items() {
		let err = Error::validation_failed(vec![ErrorItem::new("/m:a/b", "mandatory leaf missing")]);
		assert_eq!(err.code, ErrorCode::ValidationFailed);
		assert_eq!(err.items[0].path, "/m:a/b");
		assert_eq!(err.to_string(), "VALIDATION_FAILED: validation failed");
	}

	#[test]
	fn test_discriminants_are_frozen() {
		assert_eq!(ErrorCode::Ok as u32, 0);
		assert_eq!(ErrorCode::Timeout as u32, 10);
		assert_eq!(ErrorCode::Sys as u32, 15);
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Bounded waits on subscriber callbacks.
//!
//! Callbacks run in-process but belong to foreign code: a stuck one must not
//! wedge a commit. The callback runs on a helper thread and the caller waits
//! on a channel with a deadline; an overrunning callback is detached, its
//! eventual result dropped.

use std::{thread, time::Duration};

use crossbeam_channel::{RecvTimeoutError, bounded};
use yangstore_type::Error;

use crate::Result;

/// Run `f` for at most `timeout`.
pub fn call_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce() -> T + Send + 'static,
{
	let (tx, rx) = bounded(1);
	thread::spawn(move || {
		let _ = tx.send(f());
	});
	match rx.recv_timeout(timeout) {
		Ok(value) => Ok(value),
		Err(RecvTimeoutError::Timeout) => Err(Error::timeout("subscriber callback timed out")),
		Err(RecvTimeoutError::Disconnected) => {
			Err(Error::callback_failed("subscriber callback panicked"))
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_fast_callback_returns_value() {
		let result = call_with_timeout(Duration::from_secs(1), || 42).unwrap();
		assert_eq!(result, 42);
	}

	#[test]
	fn test_slow_callback_times_out() {
		let err = call_with_timeout(Duration::from_millis(20), || {
			thread::sleep(Duration::from_secs(5));
		})
		.unwrap_err();
		assert_eq!(err.code, yangstore_type::ErrorCode::Timeout);
	}

	#[test]
	fn test_panicking_callback_is_reported() {
		let err = call_with_timeout(Duration::from_secs(1), || -> i32 { panic!("boom") }).unwrap_err();
		assert_eq!(err.code, yangstore_type::ErrorCode::CallbackFailed);
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Per-(module, datastore) reader/writer locks.
//!
//! One table guarded by a mutex plus a single condvar: waiters re-check
//! their slot after every release broadcast and give up at their deadline.
//! Exclusive locks are reentrant for the holding session so a commit can
//! proceed while the same session holds an explicit datastore lock.

use std::{
	collections::HashMap,
	time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::trace;
use yangstore_core::interface::{Datastore, SessionId};
use yangstore_type::Error;

use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
	Shared,
	Exclusive,
}

type Slot = (String, Datastore);

#[derive(Default)]
struct SlotState {
	/// Reader sessions with their reentrancy counts.
	readers: HashMap<SessionId, u32>,
	writer: Option<(SessionId, u32)>,
}

impl SlotState {
	fn can_read(&self, session: SessionId) -> bool {
		match self.writer {
			None => true,
			Some((holder, _)) => holder == session,
		}
	}

	fn can_write(&self, session: SessionId) -> bool {
		let readers_ok =
			self.readers.is_empty() || (self.readers.len() == 1 && self.readers.contains_key(&session));
		let writer_ok = match self.writer {
			None => true,
			Some((holder, _)) => holder == session,
		};
		readers_ok && writer_ok
	}

	fn is_free(&self) -> bool {
		self.readers.is_empty() && self.writer.is_none()
	}
}

/// The lock table shared by every session.
#[derive(Default)]
pub struct LockManager {
	slots: Mutex<HashMap<Slot, SlotState>>,
	released: Condvar,
}

impl LockManager {
	pub fn new() -> Self {
		Self::default()
	}

	/// Acquire one slot, waiting up to `timeout`.
	pub fn acquire(
		&self,
		session: SessionId,
		module: &str,
		ds: Datastore,
		mode: LockMode,
		timeout: Duration,
	) -> Result<()> {
		let deadline = Instant::now() + timeout;
		let slot = (module.to_string(), ds);
		let mut slots = self.slots.lock();
		loop {
			let state = slots.entry(slot.clone()).or_default();
			let ready = match mode {
				LockMode::Shared => state.can_read(session),
				LockMode::Exclusive => state.can_write(session),
			};
			if ready {
				match mode {
					LockMode::Shared => {
						*state.readers.entry(session).or_insert(0) += 1;
					}
					LockMode::Exclusive => {
						let count = state.writer.map(|(_, c)| c).unwrap_or(0);
						state.writer = Some((session, count + 1));
					}
				}
				trace!(%session, module, %ds, ?mode, "lock acquired");
				return Ok(());
			}
			if self.released.wait_until(&mut slots, deadline).timed_out() {
				return Err(Error::timeout(format!(
					"could not lock {module}/{ds} within {}ms",
					timeout.as_millis()
				)));
			}
		}
	}

	pub fn release(&self, session: SessionId, module: &str, ds: Datastore, mode: LockMode) {
		let slot = (module.to_string(), ds);
		let mut slots = self.slots.lock();
		if let Some(state) = slots.get_mut(&slot) {
			match mode {
				LockMode::Shared => {
					if let Some(count) = state.readers.get_mut(&session) {
						*count -= 1;
						if *count == 0 {
							state.readers.remove(&session);
						}
					}
				}
				LockMode::Exclusive => {
					if let Some((holder, count)) = state.writer {
						if holder == session {
							state.writer = if count > 1 {
								Some((holder, count - 1))
							} else {
								None
							};
						}
					}
				}
			}
			if state.is_free() {
				slots.remove(&slot);
			}
		}
		self.released.notify_all();
	}

	/// Acquire exclusive locks on several modules atomically: on any
	/// failure every lock taken by this call is rolled back.
	pub fn acquire_all(
		&self,
		session: SessionId,
		modules: &[String],
		ds: Datastore,
		timeout: Duration,
	) -> Result<()> {
		// lexical order bounds deadlock between concurrent batch lockers
		let mut ordered: Vec<&String> = modules.iter().collect();
		ordered.sort();
		ordered.dedup();
		let mut taken: Vec<&String> = Vec::new();
		for module in ordered {
			match self.acquire(session, module, ds, LockMode::Exclusive, timeout) {
				Ok(()) => taken.push(module),
				Err(err) => {
					for module in taken {
						self.release(session, module, ds, LockMode::Exclusive);
					}
					return Err(err);
				}
			}
		}
		Ok(())
	}

	pub fn release_all(&self, session: SessionId, modules: &[String], ds: Datastore) {
		for module in modules {
			self.release(session, module, ds, LockMode::Exclusive);
		}
	}

	/// Whether `session` (or anyone, with `session` `None`) holds the
	/// exclusive lock on a slot.
	pub fn is_write_locked(&self, module: &str, ds: Datastore, session: Option<SessionId>) -> bool {
		let slots = self.slots.lock();
		match slots.get(&(module.to_string(), ds)).and_then(|s| s.writer) {
			Some((holder, _)) => session.is_none_or(|s| s == holder),
			None => false,
		}
	}

	/// Drop every lock held by `session`, in any mode, on any slot.
	pub fn release_session(&self, session: SessionId) {
		let mut slots = self.slots.lock();
		slots.retain(|_, state| {
			state.readers.remove(&session);
			if matches!(state.writer, Some((holder, _)) if holder == session) {
				state.writer = None;
			}
			!state.is_free()
		});
		self.released.notify_all();
	}
}

#[cfg(test)]
mod test {
	use std::{sync::Arc, thread};

	use super::*;

	const S1: SessionId = SessionId(1);
	const S2: SessionId = SessionId(2);
	const T: Duration = Duration::from_millis(50);

	#[test]
	fn test_shared_locks_coexist() {
		let locks = LockManager::new();
		locks.acquire(S1, "m", Datastore::Running, LockMode::Shared, T).unwrap();
		locks.acquire(S2, "m", Datastore::Running, LockMode::Shared, T).unwrap();
		locks.release(S1, "m", Datastore::Running, LockMode::Shared);
		locks.release(S2, "m", Datastore::Running, LockMode::Shared);
	}

	#[test]
	fn test_exclusive_excludes_other_sessions() {
		let locks = LockManager::new();
		locks.acquire(S1, "m", Datastore::Running, LockMode::Exclusive, T).unwrap();
		let err = locks.acquire(S2, "m", Datastore::Running, LockMode::Exclusive, T).unwrap_err();
		assert_eq!(err.code, yangstore_type::ErrorCode::Timeout);
		let err = locks.acquire(S2, "m", Datastore::Running, LockMode::Shared, T).unwrap_err();
		assert_eq!(err.code, yangstore_type::ErrorCode::Timeout);

		// different datastore, different slot
		locks.acquire(S2, "m", Datastore::Startup, LockMode::Exclusive, T).unwrap();
	}

	#[test]
	fn test_exclusive_is_reentrant_for_holder() {
		let locks = LockManager::new();
		locks.acquire(S1, "m", Datastore::Running, LockMode::Exclusive, T).unwrap();
		locks.acquire(S1, "m", Datastore::Running, LockMode::Exclusive, T).unwrap();
		locks.release(S1, "m", Datastore::Running, LockMode::Exclusive);
		// still held once
		assert!(locks.is_write_locked("m", Datastore::Running, Some(S1)));
		locks.release(S1, "m", Datastore::Running, LockMode::Exclusive);
		assert!(!locks.is_write_locked("m", Datastore::Running, None));
	}

	#[test]
	fn test_batch_acquisition_rolls_back_on_failure() {
		let locks = LockManager::new();
		locks.acquire(S2, "b", Datastore::Running, LockMode::Exclusive, T).unwrap();

		let modules = vec!["a".to_string(), "b".to_string(), "c".to_string()];
		let err = locks.acquire_all(S1, &modules, Datastore::Running, T).unwrap_err();
		assert_eq!(err.code, yangstore_type::ErrorCode::Timeout);
		// the lock taken on "a" was rolled back
		assert!(!locks.is_write_locked("a", Datastore::Running, None));
	}

	#[test]
	fn test_waiter_wakes_on_release() {
		let locks = Arc::new(LockManager::new());
		locks.acquire(S1, "m", Datastore::Running, LockMode::Exclusive, T).unwrap();

		let waiter = {
			let locks = locks.clone();
			thread::spawn(move || {
				locks.acquire(S2, "m", Datastore::Running, LockMode::Exclusive, Duration::from_secs(5))
			})
		};
		thread::sleep(Duration::from_millis(30));
		locks.release(S1, "m", Datastore::Running, LockMode::Exclusive);
		waiter.join().unwrap().unwrap();
		assert!(locks.is_write_locked("m", Datastore::Running, Some(S2)));
	}

	#[test]
	fn test_release_session_drops_everything() {
		let locks = LockManager::new();
		locks.acquire(S1, "a", Datastore::Running, LockMode::Exclusive, T).unwrap();
		locks.acquire(S1, "b", Datastore::Startup, LockMode::Shared, T).unwrap();
		locks.release_session(S1);
		locks.acquire(S2, "a", Datastore::Running, LockMode::Exclusive, T).unwrap();
		locks.acquire(S2, "b", Datastore::Startup, LockMode::Exclusive, T).unwrap();
	}
}

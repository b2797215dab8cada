// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::fmt::{Display, Formatter};

use yangstore_core::{
	change::Change,
	interface::{Datastore, SessionId, Timestamp},
	tree::DataTree,
};

/// Phase of a change transaction, as delivered to module-change subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
	/// The change list is proposed; returning an error vetoes the commit.
	Change,
	/// The commit persisted; informational.
	Done,
	/// An already-announced commit was rolled back.
	Abort,
}

impl Display for EventKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			EventKind::Change => f.write_str("change"),
			EventKind::Done => f.write_str("done"),
			EventKind::Abort => f.write_str("abort"),
		}
	}
}

/// Which phases a module-change subscription wants to see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
	pub const CHANGE: EventMask = EventMask(0b001);
	pub const DONE: EventMask = EventMask(0b010);
	pub const ABORT: EventMask = EventMask(0b100);

	pub fn all() -> EventMask {
		EventMask(0b111)
	}

	pub fn union(self, other: EventMask) -> EventMask {
		EventMask(self.0 | other.0)
	}

	pub fn contains(&self, kind: EventKind) -> bool {
		let bit = match kind {
			EventKind::Change => Self::CHANGE.0,
			EventKind::Done => Self::DONE.0,
			EventKind::Abort => Self::ABORT.0,
		};
		self.0 & bit != 0
	}
}

impl Default for EventMask {
	fn default() -> Self {
		Self::all()
	}
}

/// One delivery to a module-change subscriber.
#[derive(Clone, Debug)]
pub struct ModuleChangeEvent {
	pub kind: EventKind,
	pub module: String,
	pub datastore: Datastore,
	pub session: SessionId,
	pub changes: Vec<Change>,
}

/// How a notification reached its subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
	Realtime,
	Replay,
	/// Marker after the last replayed notification; carries no tree.
	ReplayComplete,
}

/// One delivery to a notification subscriber.
#[derive(Clone, Debug)]
pub struct NotificationEvent {
	pub kind: NotificationKind,
	pub module: String,
	pub timestamp: Timestamp,
	/// Empty for `ReplayComplete`.
	pub tree: DataTree,
}

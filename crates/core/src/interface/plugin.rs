// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};

use crate::{
	Result,
	interface::{Datastore, Identity, Timestamp},
	path::DataPath,
	tree::DataTree,
};

/// Unix-style access mode of one (module, datastore) slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsAccess {
	pub owner: String,
	pub group: String,
	pub perm: u32,
}

impl Default for DsAccess {
	fn default() -> Self {
		Self {
			owner: "root".to_string(),
			group: "root".to_string(),
			perm: 0o600,
		}
	}
}

impl DsAccess {
	/// Whether `identity` may access the slot for reading (`write` false)
	/// or writing (`write` true).
	pub fn permits(&self, identity: &Identity, write: bool) -> bool {
		if identity.is_root() {
			return true;
		}
		let (read_bit, write_bit) = if identity.user == self.owner {
			(0o400, 0o200)
		} else if identity.groups.iter().any(|g| *g == self.group) {
			(0o040, 0o020)
		} else {
			(0o004, 0o002)
		};
		let bit = if write {
			write_bit
		} else {
			read_bit
		};
		self.perm & bit != 0
	}
}

/// Contract every datastore backend implements.
///
/// One plugin instance serves every module bound to it; the engine addresses
/// slots by `(module, datastore)`. Implementations must be safe for
/// concurrent use, the engine serialises writes per slot through its locks.
pub trait StoragePlugin: Send + Sync {
	fn name(&self) -> &str;

	/// Create the slot's backing file/record, seeding it with `initial`.
	fn init(&self, module: &str, ds: Datastore, initial: Option<&DataTree>) -> Result<()>;

	/// Drop the slot's backing data entirely.
	fn destroy(&self, module: &str, ds: Datastore) -> Result<()>;

	/// Load the slot's tree; `paths` (when given) narrows the result to the
	/// selected subtrees.
	fn load(&self, module: &str, ds: Datastore, paths: Option<&[DataPath]>) -> Result<DataTree>;

	fn store(&self, module: &str, ds: Datastore, tree: &DataTree) -> Result<()>;

	fn copy(&self, module: &str, src: Datastore, dst: Datastore) -> Result<()>;

	/// Reset the candidate slot to mirror running again.
	fn candidate_reset(&self, module: &str) -> Result<()>;

	fn set_access(&self, module: &str, ds: Datastore, access: &DsAccess) -> Result<()>;

	fn get_access(&self, module: &str, ds: Datastore) -> Result<DsAccess>;

	fn check_access(&self, module: &str, ds: Datastore, identity: &Identity, write: bool) -> Result<bool> {
		Ok(self.get_access(module, ds)?.permits(identity, write))
	}

	/// When the slot's data last changed, if the backend tracks it.
	fn last_modified(&self, module: &str, ds: Datastore) -> Result<Option<Timestamp>> {
		let _ = (module, ds);
		Ok(None)
	}
}

/// A notification taken from (or headed to) a module's replay log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
	pub tree: DataTree,
	pub timestamp: Timestamp,
}

/// Contract of a notification replay backend.
pub trait NotificationPlugin: Send + Sync {
	fn name(&self) -> &str;

	fn append(&self, module: &str, notification: &DataTree, timestamp: Timestamp) -> Result<()>;

	/// Stored notifications with `from <= timestamp <= to`, oldest first.
	fn replay(&self, module: &str, from: Timestamp, to: Timestamp) -> Result<Vec<StoredNotification>>;

	/// Timestamp of the oldest stored notification, if any.
	fn earliest(&self, module: &str) -> Result<Option<Timestamp>>;

	fn destroy(&self, module: &str) -> Result<()>;
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_access_owner_group_other() {
		let access = DsAccess {
			owner: "alice".into(),
			group: "netconf".into(),
			perm: 0o640,
		};

		let alice = Identity::new("alice");
		assert!(access.permits(&alice, false));
		assert!(access.permits(&alice, true));

		let bob = Identity::with_groups("bob", vec!["netconf".into()]);
		assert!(access.permits(&bob, false));
		assert!(!access.permits(&bob, true));

		let eve = Identity::new("eve");
		assert!(!access.permits(&eve, false));
		assert!(!access.permits(&eve, true));
	}

	#[test]
	fn test_root_bypasses_mode() {
		let access = DsAccess {
			owner: "alice".into(),
			group: "netconf".into(),
			perm: 0o000,
		};
		assert!(access.permits(&Identity::root(), true));
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! In-memory storage and notification plugins.
//!
//! The default backend for modules without an explicit binding and the
//! workhorse of the test suite. Candidate slots mirror running until their
//! first store, and fall back to running again after `candidate_reset`.

use std::collections::HashMap;

use parking_lot::RwLock;
use yangstore_core::{
	interface::{Datastore, DsAccess, NotificationPlugin, StoragePlugin, StoredNotification, Timestamp},
	path::DataPath,
	tree::DataTree,
};

use crate::Result;

pub const MEMORY_PLUGIN_NAME: &str = "memory";

type Slot = (String, Datastore);

#[derive(Default)]
pub struct MemoryPlugin {
	slots: RwLock<HashMap<Slot, DataTree>>,
	access: RwLock<HashMap<Slot, DsAccess>>,
	modified: RwLock<HashMap<Slot, Timestamp>>,
}

impl MemoryPlugin {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StoragePlugin for MemoryPlugin {
	fn name(&self) -> &str {
		MEMORY_PLUGIN_NAME
	}

	fn init(&self, module: &str, ds: Datastore, initial: Option<&DataTree>) -> Result<()> {
		if ds == Datastore::Candidate {
			// candidate mirrors running until first modification
			return Ok(());
		}
		let tree = initial.cloned().unwrap_or_else(|| DataTree::new(module));
		self.slots.write().insert((module.to_string(), ds), tree);
		self.modified.write().insert((module.to_string(), ds), Timestamp::now());
		Ok(())
	}

	fn destroy(&self, module: &str, ds: Datastore) -> Result<()> {
		self.slots.write().remove(&(module.to_string(), ds));
		self.access.write().remove(&(module.to_string(), ds));
		self.modified.write().remove(&(module.to_string(), ds));
		Ok(())
	}

	fn load(&self, module: &str, ds: Datastore, paths: Option<&[DataPath]>) -> Result<DataTree> {
		let slots = self.slots.read();
		let tree = slots
			.get(&(module.to_string(), ds))
			.or_else(|| {
				if ds == Datastore::Candidate {
					slots.get(&(module.to_string(), Datastore::Running))
				} else {
					None
				}
			})
			.cloned()
			.unwrap_or_else(|| DataTree::new(module));
		Ok(match paths {
			Some(paths) => tree.extract(paths),
			None => tree,
		})
	}

	fn store(&self, module: &str, ds: Datastore, tree: &DataTree) -> Result<()> {
		self.slots.write().insert((module.to_string(), ds), tree.clone());
		self.modified.write().insert((module.to_string(), ds), Timestamp::now());
		Ok(())
	}

	fn copy(&self, module: &str, src: Datastore, dst: Datastore) -> Result<()> {
		let tree = self.load(module, src, None)?;
		self.store(module, dst, &tree)
	}

	fn candidate_reset(&self, module: &str) -> Result<()> {
		self.slots.write().remove(&(module.to_string(), Datastore::Candidate));
		Ok(())
	}

	fn set_access(&self, module: &str, ds: Datastore, access: &DsAccess) -> Result<()> {
		self.access.write().insert((module.to_string(), ds), access.clone());
		Ok(())
	}

	fn get_access(&self, module: &str, ds: Datastore) -> Result<DsAccess> {
		Ok(self.access.read().get(&(module.to_string(), ds)).cloned().unwrap_or_default())
	}

	fn last_modified(&self, module: &str, ds: Datastore) -> Result<Option<Timestamp>> {
		Ok(self.modified.read().get(&(module.to_string(), ds)).copied())
	}
}

pub const MEMORY_NOTIFICATION_PLUGIN_NAME: &str = "memory-notif";

#[derive(Default)]
pub struct MemoryNotificationPlugin {
	log: RwLock<HashMap<String, Vec<StoredNotification>>>,
}

impl MemoryNotificationPlugin {
	pub fn new() -> Self {
		Self::default()
	}
}

impl NotificationPlugin for MemoryNotificationPlugin {
	fn name(&self) -> &str {
		MEMORY_NOTIFICATION_PLUGIN_NAME
	}

	fn append(&self, module: &str, notification: &DataTree, timestamp: Timestamp) -> Result<()> {
		self.log.write().entry(module.to_string()).or_default().push(StoredNotification {
			tree: notification.clone(),
			timestamp,
		});
		Ok(())
	}

	fn replay(&self, module: &str, from: Timestamp, to: Timestamp) -> Result<Vec<StoredNotification>> {
		Ok(self
			.log
			.read()
			.get(module)
			.map(|entries| {
				entries.iter().filter(|n| n.timestamp >= from && n.timestamp <= to).cloned().collect()
			})
			.unwrap_or_default())
	}

	fn earliest(&self, module: &str) -> Result<Option<Timestamp>> {
		Ok(self.log.read().get(module).and_then(|entries| entries.first()).map(|n| n.timestamp))
	}

	fn destroy(&self, module: &str) -> Result<()> {
		self.log.write().remove(module);
		Ok(())
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! JSON file-backed storage and notification plugins.
//!
//! One file per (module, datastore) slot under a configured root directory:
//! `<module>.<datastore>.json`, with access modes in a `.access.json`
//! sidecar and notification logs in `<module>.notif.jsonl`. Stores go
//! through a temp file plus rename so a crashed writer never leaves a
//! half-written slot behind.

use std::{
	fs,
	io::Write,
	path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::debug;
use yangstore_core::{
	interface::{Datastore, DsAccess, NotificationPlugin, StoragePlugin, StoredNotification, Timestamp},
	path::DataPath,
	tree::DataTree,
};
use yangstore_type::Error;

use crate::Result;

pub const JSON_FILE_PLUGIN_NAME: &str = "json-file";

pub struct JsonFilePlugin {
	root: PathBuf,
	// serialises store+rename pairs; readers go through the filesystem
	write_lock: Mutex<()>,
}

impl JsonFilePlugin {
	pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		fs::create_dir_all(&root)?;
		Ok(Self {
			root,
			write_lock: Mutex::new(()),
		})
	}

	fn data_path(&self, module: &str, ds: Datastore) -> PathBuf {
		self.root.join(format!("{module}.{ds}.json"))
	}

	fn access_path(&self, module: &str, ds: Datastore) -> PathBuf {
		self.root.join(format!("{module}.{ds}.access.json"))
	}

	fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
		let _guard = self.write_lock.lock();
		let tmp = path.with_extension("json.tmp");
		fs::write(&tmp, contents)?;
		fs::rename(&tmp, path)?;
		Ok(())
	}

	fn read_tree(&self, path: &Path, module: &str) -> Result<Option<DataTree>> {
		if !path.exists() {
			return Ok(None);
		}
		let text = fs::read_to_string(path)?;
		let tree: DataTree =
			serde_json::from_str(&text).map_err(|e| Error::sys(format!("corrupt data file for '{module}': {e}")))?;
		Ok(Some(tree))
	}
}

impl StoragePlugin for JsonFilePlugin {
	fn name(&self) -> &str {
		JSON_FILE_PLUGIN_NAME
	}

	fn init(&self, module: &str, ds: Datastore, initial: Option<&DataTree>) -> Result<()> {
		if ds == Datastore::Candidate {
			return Ok(());
		}
		let tree = initial.cloned().unwrap_or_else(|| DataTree::new(module));
		debug!(target: "yangstore::storage", "init data file module={module} ds={ds}");
		self.write_atomic(
			&self.data_path(module, ds),
			&serde_json::to_string_pretty(&tree).map_err(|e| Error::internal(e.to_string()))?,
		)
	}

	fn destroy(&self, module: &str, ds: Datastore) -> Result<()> {
		let _ = fs::remove_file(self.data_path(module, ds));
		let _ = fs::remove_file(self.access_path(module, ds));
		Ok(())
	}

	fn load(&self, module: &str, ds: Datastore, paths: Option<&[DataPath]>) -> Result<DataTree> {
		let tree = match self.read_tree(&self.data_path(module, ds), module)? {
			Some(tree) => tree,
			None if ds == Datastore::Candidate => self
				.read_tree(&self.data_path(module, Datastore::Running), module)?
				.unwrap_or_else(|| DataTree::new(module)),
			None => DataTree::new(module),
		};
		Ok(match paths {
			Some(paths) => tree.extract(paths),
			None => tree,
		})
	}

	fn store(&self, module: &str, ds: Datastore, tree: &DataTree) -> Result<()> {
		self.write_atomic(
			&self.data_path(module, ds),
			&serde_json::to_string_pretty(tree).map_err(|e| Error::internal(e.to_string()))?,
		)
	}

	fn copy(&self, module: &str, src: Datastore, dst: Datastore) -> Result<()> {
		let tree = self.load(module, src, None)?;
		self.store(module, dst, &tree)
	}

	fn candidate_reset(&self, module: &str) -> Result<()> {
		let _ = fs::remove_file(self.data_path(module, Datastore::Candidate));
		Ok(())
	}

	fn set_access(&self, module: &str, ds: Datastore, access: &DsAccess) -> Result<()> {
		self.write_atomic(
			&self.access_path(module, ds),
			&serde_json::to_string_pretty(access).map_err(|e| Error::internal(e.to_string()))?,
		)
	}

	fn get_access(&self, module: &str, ds: Datastore) -> Result<DsAccess> {
		let path = self.access_path(module, ds);
		if !path.exists() {
			return Ok(DsAccess::default());
		}
		let text = fs::read_to_string(&path)?;
		serde_json::from_str(&text).map_err(|e| Error::sys(format!("corrupt access file for '{module}': {e}")))
	}

	fn last_modified(&self, module: &str, ds: Datastore) -> Result<Option<Timestamp>> {
		let path = self.data_path(module, ds);
		if !path.exists() {
			return Ok(None);
		}
		let mtime = fs::metadata(&path)?.modified()?;
		let millis = mtime.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
		Ok(Some(Timestamp(millis)))
	}
}

pub const JSONL_NOTIFICATION_PLUGIN_NAME: &str = "jsonl-notif";

pub struct JsonlNotificationPlugin {
	root: PathBuf,
	append_lock: Mutex<()>,
}

impl JsonlNotificationPlugin {
	pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		fs::create_dir_all(&root)?;
		Ok(Self {
			root,
			append_lock: Mutex::new(()),
		})
	}

	fn log_path(&self, module: &str) -> PathBuf {
		self.root.join(format!("{module}.notif.jsonl"))
	}

	fn read_log(&self, module: &str) -> Result<Vec<StoredNotification>> {
		let path = self.log_path(module);
		if !path.exists() {
			return Ok(Vec::new());
		}
		let text = fs::read_to_string(&path)?;
		let mut out = Vec::new();
		for line in text.lines().filter(|l| !l.trim().is_empty()) {
			let entry: StoredNotification = serde_json::from_str(line)
				.map_err(|e| Error::sys(format!("corrupt notification log for '{module}': {e}")))?;
			out.push(entry);
		}
		Ok(out)
	}
}

impl NotificationPlugin for JsonlNotificationPlugin {
	fn name(&self) -> &str {
		JSONL_NOTIFICATION_PLUGIN_NAME
	}

	fn append(&self, module: &str, notification: &DataTree, timestamp: Timestamp) -> Result<()> {
		let entry = StoredNotification {
			tree: notification.clone(),
			timestamp,
		};
		let line = serde_json::to_string(&entry).map_err(|e| Error::internal(e.to_string()))?;
		let _guard = self.append_lock.lock();
		let mut file = fs::OpenOptions::new().create(true).append(true).open(self.log_path(module))?;
		writeln!(file, "{line}")?;
		Ok(())
	}

	fn replay(&self, module: &str, from: Timestamp, to: Timestamp) -> Result<Vec<StoredNotification>> {
		Ok(self.read_log(module)?.into_iter().filter(|n| n.timestamp >= from && n.timestamp <= to).collect())
	}

	fn earliest(&self, module: &str) -> Result<Option<Timestamp>> {
		Ok(self.read_log(module)?.first().map(|n| n.timestamp))
	}

	fn destroy(&self, module: &str) -> Result<()> {
		let _ = fs::remove_file(self.log_path(module));
		Ok(())
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Client sessions.
//!
//! A session buffers edit operations and mirrors them in per-module working
//! copies (copy-on-first-touch). Reads always see the persisted datastore;
//! buffered edits become visible to everyone only through `apply_changes`.
//! Dropping a session releases its locks and discards its buffers.

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
	time::Duration,
};

use tracing::instrument;
use yangstore_core::{
	change::MovePosition,
	edit::{DefaultOp, EditOp, EditOptions},
	event::EngineEvent,
	interface::{Datastore, Identity, SessionId},
	path::DataPath,
	tree::DataTree,
};
use yangstore_registry::SELF_MODULE_NAME;
use yangstore_transaction::{
	BufferedOp, ModuleCommit, apply_changes, apply_op, materialize_defaults, replay_ops, validate_module,
};
use yangstore_type::{Error, Value};

use crate::{Result, engine::EngineInner};

pub struct Session {
	pub(crate) engine: Arc<EngineInner>,
	id: SessionId,
	identity: Identity,
	datastore: Datastore,
	ops: Vec<BufferedOp>,
	pub(crate) working: HashMap<String, DataTree>,
	modified: HashSet<String>,
	held_locks: HashSet<String>,
	stopped: bool,
}

impl Session {
	pub(crate) fn new(engine: Arc<EngineInner>, id: SessionId, identity: Identity, datastore: Datastore) -> Self {
		Self {
			engine,
			id,
			identity,
			datastore,
			ops: Vec::new(),
			working: HashMap::new(),
			modified: HashSet::new(),
			held_locks: HashSet::new(),
			stopped: false,
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	pub fn datastore(&self) -> Datastore {
		self.datastore
	}

	pub fn has_pending_changes(&self) -> bool {
		!self.ops.is_empty()
	}

	/// Buffered operations with their replay error flags.
	pub fn pending_ops(&self) -> &[BufferedOp] {
		&self.ops
	}

	/// Switch the active datastore. Pending changes must be applied or
	/// discarded first.
	pub fn switch_ds(&mut self, datastore: Datastore) -> Result<()> {
		if !self.ops.is_empty() {
			return Err(Error::operation_failed(
				"cannot switch datastore with pending changes; apply or discard first",
			));
		}
		self.working.clear();
		self.datastore = datastore;
		Ok(())
	}

	// --- edits ------------------------------------------------------------

	pub fn set_item(&mut self, path: &str, value: Option<Value>) -> Result<()> {
		self.set_item_opts(path, value, EditOptions::default())
	}

	pub fn set_item_opts(&mut self, path: &str, value: Option<Value>, options: EditOptions) -> Result<()> {
		let path = DataPath::parse(path)?;
		self.buffer(EditOp::Set {
			path,
			value,
			options,
		})
	}

	pub fn delete_item(&mut self, path: &str) -> Result<()> {
		self.delete_item_opts(path, EditOptions::default())
	}

	pub fn delete_item_opts(&mut self, path: &str, options: EditOptions) -> Result<()> {
		let path = DataPath::parse(path)?;
		self.buffer(EditOp::Delete {
			path,
			options,
		})
	}

	pub fn move_item(&mut self, path: &str, position: MovePosition) -> Result<()> {
		let path = DataPath::parse(path)?;
		self.buffer(EditOp::Move {
			path,
			position,
			options: EditOptions::default(),
		})
	}

	pub fn edit_batch(&mut self, tree: DataTree, default_op: DefaultOp) -> Result<()> {
		self.buffer(EditOp::EditBatch {
			tree,
			default_op,
		})
	}

	/// Replace the whole configuration of the tree's module.
	pub fn replace_config(&mut self, tree: DataTree) -> Result<()> {
		self.buffer(EditOp::ReplaceConfig {
			tree,
		})
	}

	fn buffer(&mut self, op: EditOp) -> Result<()> {
		let module = op.module().to_string();
		self.check_access(&module, true)?;
		let ctx = self.engine.registry.context();
		let tree = match self.working.entry(module.clone()) {
			std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
			std::collections::hash_map::Entry::Vacant(entry) => {
				let plugin = self.engine.registry.storage_plugin(&module, self.datastore)?;
				entry.insert(plugin.load(&module, self.datastore, None)?)
			}
		};
		apply_op(&ctx, tree, &op)?;
		self.ops.push(BufferedOp::new(op));
		self.modified.insert(module.clone());
		self.engine.mark_dirty(&module, self.datastore, self.id);
		Ok(())
	}

	// --- validation and commit -------------------------------------------

	/// Validate the session's working copies without committing.
	pub fn validate(&self) -> Result<()> {
		let ctx = self.engine.registry.context();
		let access = self.data_access();
		for module in &self.modified {
			let mut tree = self.working.get(module).cloned().unwrap_or_else(|| DataTree::new(module));
			validate_module(&ctx, &mut tree, &access)?;
		}
		Ok(())
	}

	#[instrument(name = "session::apply_changes", skip(self), fields(session = %self.id))]
	pub fn apply_changes(&mut self) -> Result<()> {
		if self.modified.is_empty() {
			self.ops.clear();
			return Ok(());
		}
		let ctx = self.engine.registry.context();
		let mut modules: Vec<String> = self.modified.iter().cloned().collect();
		modules.sort();

		let mut commits = Vec::new();
		for module in &modules {
			let baseline = self.load_store(module)?;
			let working = self.working.get(module).cloned().unwrap_or_else(|| DataTree::new(module));
			commits.push(ModuleCommit {
				module: module.clone(),
				baseline,
				working,
			});
		}

		let access = self.data_access();
		let engine = self.engine.clone();
		let ds = self.datastore;
		let persist = move |module: &str, tree: &DataTree| -> Result<()> {
			engine.registry.storage_plugin(module, ds)?.store(module, ds, tree)
		};

		apply_changes(
			&ctx,
			&self.engine.locks,
			&self.engine.subs,
			self.id,
			self.datastore,
			commits,
			&access,
			&persist,
			&self.engine.config.commit,
		)?;

		self.ops.clear();
		self.working.clear();
		self.engine.clear_dirty(self.id, &modules, self.datastore);
		self.modified.clear();
		Ok(())
	}

	pub fn discard_changes(&mut self) {
		let modules: Vec<String> = self.modified.iter().cloned().collect();
		self.engine.clear_dirty(self.id, &modules, self.datastore);
		self.ops.clear();
		self.working.clear();
		self.modified.clear();
	}

	/// Re-apply the buffered operations on top of freshly loaded data.
	///
	/// With `continue_on_error`, failed operations are flagged
	/// (`pending_ops`) and reported; the rest stay effective.
	pub fn refresh(&mut self, continue_on_error: bool) -> Result<Vec<(usize, Error)>> {
		let ctx = self.engine.registry.context();
		let modules: Vec<String> = self.ops.iter().map(|b| b.op.module().to_string()).collect();
		let mut trees: HashMap<String, DataTree> = HashMap::new();
		for module in &modules {
			if !trees.contains_key(module) {
				trees.insert(module.clone(), self.load_store(module)?);
			}
		}
		let failures = replay_ops(&ctx, &mut trees, &mut self.ops, continue_on_error)?;
		self.working = trees;
		Ok(failures)
	}

	// --- locks ------------------------------------------------------------

	/// Take the exclusive lock on one module, or on the whole datastore
	/// when `module` is `None`. Non-blocking unless `blocking`.
	pub fn lock(&mut self, module: Option<&str>, blocking: bool) -> Result<()> {
		if self.datastore == Datastore::Candidate {
			return Err(Error::unsupported("the candidate datastore is not lockable"));
		}
		let targets = self.lock_targets(module)?;
		for target in &targets {
			if self.engine.is_dirty(target, self.datastore) {
				return Err(Error::operation_failed(format!(
					"module '{target}' has uncommitted changes; apply or discard them first"
				)));
			}
		}
		let timeout = if blocking {
			self.engine.config.commit.lock_timeout
		} else {
			Duration::ZERO
		};
		self.engine.locks.acquire_all(self.id, &targets, self.datastore, timeout).map_err(|err| {
			if blocking {
				err
			} else {
				Error::locked(err.message)
			}
		})?;
		self.held_locks.extend(targets);
		Ok(())
	}

	pub fn unlock(&mut self, module: Option<&str>) -> Result<()> {
		let targets = self.lock_targets(module)?;
		for target in &targets {
			if !self.held_locks.contains(target) {
				return Err(Error::operation_failed(format!(
					"module '{target}' is not locked by this session"
				)));
			}
		}
		self.engine.locks.release_all(self.id, &targets, self.datastore);
		for target in &targets {
			self.held_locks.remove(target);
		}
		Ok(())
	}

	fn lock_targets(&self, module: Option<&str>) -> Result<Vec<String>> {
		match module {
			Some(module) => {
				if !self.engine.registry.has_module(module) {
					return Err(Error::not_found(format!("module '{module}' is not installed")));
				}
				Ok(vec![module.to_string()])
			}
			None => Ok(self
				.engine
				.registry
				.records()
				.into_iter()
				.map(|r| r.name)
				.filter(|name| name != SELF_MODULE_NAME)
				.collect()),
		}
	}

	// --- datastore copies -------------------------------------------------

	/// Copy `src` into `dst` for one module (or every user module),
	/// driving the change pipeline of `dst` so its subscribers see the
	/// result as a regular commit.
	#[instrument(name = "session::copy_config", skip(self), fields(session = %self.id))]
	pub fn copy_config(&mut self, module: Option<&str>, src: Datastore, dst: Datastore) -> Result<()> {
		if src == dst {
			return Err(Error::inval_arg("source and destination datastores are identical"));
		}
		if dst == Datastore::Operational || src == Datastore::Operational {
			return Err(Error::unsupported("copy-config works on conventional datastores"));
		}
		let modules = match module {
			Some(module) => vec![module.to_string()],
			None => self
				.engine
				.registry
				.records()
				.into_iter()
				.map(|r| r.name)
				.filter(|name| name != SELF_MODULE_NAME)
				.collect(),
		};

		let ctx = self.engine.registry.context();
		let mut commits = Vec::new();
		for module in &modules {
			self.check_access(module, true)?;
			let plugin = self.engine.registry.storage_plugin(module, src)?;
			let working = plugin.load(module, src, None)?;
			let baseline = self.engine.registry.storage_plugin(module, dst)?.load(module, dst, None)?;
			commits.push(ModuleCommit {
				module: module.clone(),
				baseline,
				working,
			});
		}

		let engine = self.engine.clone();
		let access = move |module: &str| -> Result<DataTree> {
			let mut tree = engine.registry.storage_plugin(module, dst)?.load(module, dst, None)?;
			materialize_defaults(&engine.registry.context(), &mut tree)?;
			Ok(tree)
		};
		let engine = self.engine.clone();
		let persist = move |module: &str, tree: &DataTree| -> Result<()> {
			engine.registry.storage_plugin(module, dst)?.store(module, dst, tree)
		};

		apply_changes(
			&ctx,
			&self.engine.locks,
			&self.engine.subs,
			self.id,
			dst,
			commits,
			&access,
			&persist,
			&self.engine.config.commit,
		)?;
		Ok(())
	}

	/// Reset the candidate datastore of one module (or all) back to
	/// mirroring running.
	pub fn candidate_reset(&mut self, module: Option<&str>) -> Result<()> {
		let modules = match module {
			Some(module) => vec![module.to_string()],
			None => self.engine.registry.records().into_iter().map(|r| r.name).collect(),
		};
		for module in modules {
			let plugin = self.engine.registry.storage_plugin(&module, Datastore::Candidate)?;
			plugin.candidate_reset(&module)?;
		}
		Ok(())
	}

	// --- internals --------------------------------------------------------

	pub(crate) fn load_store(&self, module: &str) -> Result<DataTree> {
		let plugin = self.engine.registry.storage_plugin(module, self.datastore)?;
		plugin.load(module, self.datastore, None)
	}

	pub(crate) fn check_access(&self, module: &str, write: bool) -> Result<()> {
		let allowed =
			self.engine.registry.check_module_ds_access(module, self.datastore, &self.identity, write)?;
		if !allowed {
			return Err(Error::operation_failed(format!(
				"user '{}' may not {} module '{module}' in {}",
				self.identity.user,
				if write {
					"write"
				} else {
					"read"
				},
				self.datastore
			)));
		}
		Ok(())
	}

	/// Cross-module read view for validation: working copies first, then
	/// the persisted datastore with defaults materialised.
	pub(crate) fn data_access(&self) -> impl yangstore_transaction::DataAccess + use<> {
		let snapshot = self.working.clone();
		let engine = self.engine.clone();
		let ds = self.datastore;
		move |module: &str| -> Result<DataTree> {
			if let Some(tree) = snapshot.get(module) {
				return Ok(tree.clone());
			}
			let ctx = engine.registry.context();
			let mut tree = engine.registry.storage_plugin(module, ds)?.load(module, ds, None)?;
			materialize_defaults(&ctx, &mut tree)?;
			Ok(tree)
		}
	}

	fn shutdown(&mut self) {
		if self.stopped {
			return;
		}
		self.stopped = true;
		let modules: Vec<String> = self.modified.iter().cloned().collect();
		self.engine.clear_dirty(self.id, &modules, self.datastore);
		self.engine.locks.release_session(self.id);
		self.engine.events.emit(EngineEvent::SessionStopped {
			session: self.id,
		});
	}

	pub fn session_stop(mut self) {
		self.shutdown();
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.shutdown();
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The engine: shared state and the non-session operation surface.

use std::{
	collections::{HashMap, HashSet},
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};

use parking_lot::Mutex;
use tracing::instrument;
use yangstore_core::{
	event::{EngineEvent, EventBus},
	interface::{Datastore, DsAccess, Identity, SessionId},
	path::DataPath,
	tree::DataTree,
};
use yangstore_registry::{DsBindings, InstallRequest, ModuleRecord, ModuleRegistry, PluginSet};
use yangstore_schema::{ModuleDef, SchemaContext};
use yangstore_subscription::{
	EventMask, ModuleChangeCallback, NotificationCallback, OperProviderCallback, RpcCallback, SubscriptionId,
	SubscriptionRegistry,
};
use yangstore_transaction::{CommitSettings, LockManager};
use yangstore_type::Error;

use crate::{Result, session::Session};

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
	pub commit: CommitSettings,
	/// How long an operational read waits for one pull provider.
	pub provider_timeout: Duration,
	/// How long reads wait for a shared module lock.
	pub read_lock_timeout: Duration,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			commit: CommitSettings::default(),
			provider_timeout: Duration::from_secs(3),
			read_lock_timeout: Duration::from_secs(5),
		}
	}
}

pub(crate) struct EngineInner {
	pub registry: ModuleRegistry,
	pub locks: LockManager,
	pub subs: SubscriptionRegistry,
	pub events: EventBus,
	pub config: EngineConfig,
	next_session: AtomicU32,
	/// Modules with uncommitted session edits, per (module, datastore).
	/// Enforces the modification-before-lock rule across sessions.
	pub dirty: Mutex<HashMap<(String, Datastore), HashSet<SessionId>>>,
}

impl EngineInner {
	pub fn mark_dirty(&self, module: &str, ds: Datastore, session: SessionId) {
		self.dirty.lock().entry((module.to_string(), ds)).or_default().insert(session);
	}

	pub fn clear_dirty(&self, session: SessionId, modules: &[String], ds: Datastore) {
		let mut dirty = self.dirty.lock();
		for module in modules {
			if let Some(set) = dirty.get_mut(&(module.clone(), ds)) {
				set.remove(&session);
				if set.is_empty() {
					dirty.remove(&(module.clone(), ds));
				}
			}
		}
	}

	pub fn is_dirty(&self, module: &str, ds: Datastore) -> bool {
		self.dirty.lock().contains_key(&(module.to_string(), ds))
	}
}

/// The shared datastore engine. Cheap to clone; every session holds one.
#[derive(Clone)]
pub struct Engine {
	pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
	/// Build an engine over the given plugins. `default_bindings` selects
	/// the plugins backing the registry itself and modules installed
	/// without explicit bindings.
	pub fn new(plugins: PluginSet, default_bindings: DsBindings, config: EngineConfig) -> Result<Engine> {
		let registry = ModuleRegistry::bootstrap(plugins, default_bindings)?;
		Ok(Engine {
			inner: Arc::new(EngineInner {
				registry,
				locks: LockManager::new(),
				subs: SubscriptionRegistry::new(),
				events: EventBus::new(),
				config,
				next_session: AtomicU32::new(0),
				dirty: Mutex::new(HashMap::new()),
			}),
		})
	}

	pub fn events(&self) -> &EventBus {
		&self.inner.events
	}

	pub fn context(&self) -> Arc<SchemaContext> {
		self.inner.registry.context()
	}

	/// Monotone counter stamping the current registry/schema pair.
	pub fn content_id(&self) -> u64 {
		self.inner.registry.content_id()
	}

	pub fn list_modules(&self) -> Vec<ModuleRecord> {
		self.inner.registry.records()
	}

	#[instrument(name = "engine::session_start", skip(self, identity), fields(user = %identity.user))]
	pub fn session_start(&self, identity: Identity, datastore: Datastore) -> Session {
		let id = SessionId(self.inner.next_session.fetch_add(1, Ordering::Relaxed) + 1);
		self.inner.events.emit(EngineEvent::SessionStarted {
			session: id,
		});
		Session::new(self.inner.clone(), id, identity, datastore)
	}

	// --- module lifecycle -------------------------------------------------

	pub fn install_module(&self, request: InstallRequest) -> Result<()> {
		let name = request.def.name.clone();
		self.inner.registry.install(vec![request])?;
		self.inner.events.emit(EngineEvent::ModuleInstalled {
			module: name,
		});
		self.emit_swapped();
		Ok(())
	}

	/// Install with initial datastore content, the counterpart of plain
	/// `install_module`.
	pub fn install_module_with_data(&self, request: InstallRequest, initial: DataTree) -> Result<()> {
		self.install_module(request.with_initial_data(initial))
	}

	pub fn install_modules(&self, requests: Vec<InstallRequest>) -> Result<()> {
		let names: Vec<String> = requests.iter().map(|r| r.def.name.clone()).collect();
		self.inner.registry.install(requests)?;
		for module in names {
			self.inner.events.emit(EngineEvent::ModuleInstalled {
				module,
			});
		}
		self.emit_swapped();
		Ok(())
	}

	pub fn remove_module(&self, module: &str) -> Result<()> {
		self.remove_modules(&[module])
	}

	pub fn remove_modules(&self, modules: &[&str]) -> Result<()> {
		self.inner.registry.remove(modules)?;
		for module in modules {
			self.inner.events.emit(EngineEvent::ModuleRemoved {
				module: module.to_string(),
			});
		}
		self.emit_swapped();
		Ok(())
	}

	pub fn update_module(&self, def: ModuleDef) -> Result<()> {
		self.inner.registry.update(def)?;
		self.emit_swapped();
		Ok(())
	}

	pub fn enable_feature(&self, module: &str, feature: &str) -> Result<()> {
		self.inner.registry.enable_feature(module, feature)?;
		self.emit_swapped();
		Ok(())
	}

	pub fn disable_feature(&self, module: &str, feature: &str) -> Result<()> {
		self.inner.registry.disable_feature(module, feature)?;
		self.emit_swapped();
		Ok(())
	}

	pub fn set_module_replay_support(&self, module: Option<&str>, enable: bool) -> Result<()> {
		self.inner.registry.set_replay_support(module, enable)
	}

	pub fn get_module_ds_access(&self, module: &str, ds: Datastore) -> Result<DsAccess> {
		self.inner.registry.get_module_ds_access(module, ds)
	}

	pub fn set_module_ds_access(&self, module: &str, ds: Datastore, access: &DsAccess) -> Result<()> {
		self.inner.registry.set_module_ds_access(module, ds, access)
	}

	pub fn check_module_ds_access(
		&self,
		module: &str,
		ds: Datastore,
		identity: &Identity,
		write: bool,
	) -> Result<bool> {
		self.inner.registry.check_module_ds_access(module, ds, identity, write)
	}

	fn emit_swapped(&self) {
		self.inner.events.emit(EngineEvent::SchemaSwapped {
			content_id: self.inner.registry.content_id(),
		});
	}

	// --- subscriptions ----------------------------------------------------

	pub fn subscribe_module_change(
		&self,
		module: &str,
		datastore: Datastore,
		xpath: Option<&str>,
		priority: u32,
		mask: EventMask,
		callback: ModuleChangeCallback,
	) -> Result<SubscriptionId> {
		if !self.inner.registry.has_module(module) {
			return Err(Error::not_found(format!("module '{module}' is not installed")));
		}
		let xpath = xpath.map(DataPath::parse).transpose()?;
		Ok(self.inner.subs.subscribe_module_change(module, datastore, xpath, priority, mask, callback))
	}

	pub fn subscribe_oper_get(&self, xpath: &str, callback: OperProviderCallback) -> Result<SubscriptionId> {
		let path = DataPath::parse(xpath)?;
		let module = path.module().to_string();
		if !self.inner.registry.has_module(&module) {
			return Err(Error::not_found(format!("module '{module}' is not installed")));
		}
		Ok(self.inner.subs.subscribe_oper(module, path, callback))
	}

	pub fn subscribe_rpc(&self, xpath: &str, callback: RpcCallback) -> Result<SubscriptionId> {
		let path = DataPath::parse(xpath)?;
		// the path must name an rpc or action in the schema
		let context = self.context();
		let node = context.resolve(&path)?;
		if !matches!(
			node.kind,
			yangstore_schema::NodeKind::Rpc | yangstore_schema::NodeKind::Action
		) {
			return Err(Error::inval_arg(format!("'{xpath}' is not an rpc or action")));
		}
		self.inner.subs.subscribe_rpc(path, callback)
	}

	pub fn subscribe_notification(
		&self,
		module: &str,
		xpath: Option<&str>,
		replay_from: Option<yangstore_core::interface::Timestamp>,
		callback: NotificationCallback,
	) -> Result<SubscriptionId> {
		crate::rpc::subscribe_notification(self, module, xpath, replay_from, callback)
	}

	pub fn unsubscribe(&self, id: SubscriptionId) {
		self.inner.subs.unsubscribe(id);
	}

	/// Transport-level hook: a subscriber's connection died.
	pub fn subscriber_gone(&self, id: SubscriptionId) {
		self.inner.subs.mark_dead(id);
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The module registry service and its lifecycle transactions.
//!
//! All mutation goes through one exclusive path: build a tentative document
//! and definition set, compile the tentative schema context, rebuild every
//! module's dependencies, validate the document against the self module's
//! schema, persist it, and only then swap the live context. A failure at any
//! step leaves the previous state untouched; a storage failure after the
//! swap is unrecoverable and surfaced as `Internal`.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};
use yangstore_core::{
	interface::{Datastore, DsAccess, Identity, NotificationPlugin, StoragePlugin, Timestamp},
	tree::DataTree,
};
use yangstore_schema::{ModuleDef, SchemaContext, validate::check_structure};
use yangstore_type::{Error, Value};

use crate::{
	Result,
	deps::analyze,
	record::{DsBindings, ModuleRecord, RegistryDoc, ReplaySupport},
	self_module::{SELF_MODULE_NAME, self_module_def},
};

/// The storage and notification plugins known to the engine, keyed by name.
#[derive(Clone, Default)]
pub struct PluginSet {
	storage: IndexMap<String, Arc<dyn StoragePlugin>>,
	notification: IndexMap<String, Arc<dyn NotificationPlugin>>,
}

impl PluginSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_storage(mut self, plugin: Arc<dyn StoragePlugin>) -> Self {
		self.storage.insert(plugin.name().to_string(), plugin);
		self
	}

	pub fn with_notification(mut self, plugin: Arc<dyn NotificationPlugin>) -> Self {
		self.notification.insert(plugin.name().to_string(), plugin);
		self
	}

	pub fn storage(&self, name: &str) -> Result<Arc<dyn StoragePlugin>> {
		self.storage
			.get(name)
			.cloned()
			.ok_or_else(|| Error::not_found(format!("storage plugin '{name}' is not registered")))
	}

	pub fn notification(&self, name: &str) -> Result<Arc<dyn NotificationPlugin>> {
		self.notification
			.get(name)
			.cloned()
			.ok_or_else(|| Error::not_found(format!("notification plugin '{name}' is not registered")))
	}
}

/// One module of an install batch.
#[derive(Clone)]
pub struct InstallRequest {
	pub def: ModuleDef,
	/// Definitions of imported and included modules, available for
	/// automatic pull-in when the dependency is not installed yet.
	pub import_defs: Vec<ModuleDef>,
	pub bindings: DsBindings,
	pub features: Vec<String>,
	pub owner: String,
	pub group: String,
	pub perm: u32,
	pub initial_data: Option<DataTree>,
}

impl InstallRequest {
	pub fn new(def: ModuleDef, bindings: DsBindings) -> Self {
		Self {
			def,
			import_defs: Vec::new(),
			bindings,
			features: Vec::new(),
			owner: "root".to_string(),
			group: "root".to_string(),
			perm: 0o600,
			initial_data: None,
		}
	}

	pub fn with_features(mut self, features: Vec<&str>) -> Self {
		self.features = features.into_iter().map(String::from).collect();
		self
	}

	pub fn with_import_def(mut self, def: ModuleDef) -> Self {
		self.import_defs.push(def);
		self
	}

	pub fn with_initial_data(mut self, tree: DataTree) -> Self {
		self.initial_data = Some(tree);
		self
	}
}

struct State {
	doc: RegistryDoc,
	defs: IndexMap<String, ModuleDef>,
	context: Arc<SchemaContext>,
}

/// The registry service. Readers take a short shared lock; lifecycle
/// operations hold the exclusive lock for the whole transaction.
pub struct ModuleRegistry {
	plugins: PluginSet,
	default_bindings: DsBindings,
	state: RwLock<State>,
}

impl ModuleRegistry {
	/// Build a registry containing only the self module.
	///
	/// `default_bindings` names the plugins used for the self module and for
	/// modules installed without explicit bindings; its startup entry is
	/// where the registry document itself persists. A document persisted by
	/// an earlier run continues the content-id sequence.
	#[instrument(name = "registry::bootstrap", skip(plugins, default_bindings))]
	pub fn bootstrap(plugins: PluginSet, default_bindings: DsBindings) -> Result<Self> {
		let startup = plugins.storage(&default_bindings.startup)?;
		let resumed_content_id = match startup.load(SELF_MODULE_NAME, Datastore::Startup, None) {
			Ok(tree) => persisted_content_id(&tree),
			Err(err) => {
				warn!("previous registry document unreadable, starting fresh: {err}");
				0
			}
		};

		let registry = Self {
			plugins,
			default_bindings: default_bindings.clone(),
			state: RwLock::new(State {
				doc: RegistryDoc {
					content_id: resumed_content_id,
					modules: IndexMap::new(),
				},
				defs: IndexMap::new(),
				context: Arc::new(SchemaContext::default()),
			}),
		};

		{
			let mut state = registry.state.write();
			let mut doc = RegistryDoc {
				content_id: state.doc.content_id,
				modules: IndexMap::new(),
			};
			doc.modules.insert(SELF_MODULE_NAME.to_string(), ModuleRecord {
				name: SELF_MODULE_NAME.to_string(),
				revision: self_module_def().revision,
				features: Vec::new(),
				plugins: default_bindings,
				replay: None,
				owner: "root".to_string(),
				group: "root".to_string(),
				perm: 0o600,
				deps: Vec::new(),
				op_deps: Vec::new(),
				inverse_deps: Vec::new(),
			});
			let mut defs = IndexMap::new();
			defs.insert(SELF_MODULE_NAME.to_string(), self_module_def());
			registry.finalize(&mut state, doc, defs, |_| Ok(()))?;
		}
		Ok(registry)
	}

	/// The current compiled schema context.
	pub fn context(&self) -> Arc<SchemaContext> {
		self.state.read().context.clone()
	}

	pub fn content_id(&self) -> u64 {
		self.state.read().doc.content_id
	}

	pub fn record(&self, module: &str) -> Result<ModuleRecord> {
		self.state
			.read()
			.doc
			.modules
			.get(module)
			.cloned()
			.ok_or_else(|| Error::not_found(format!("module '{module}' is not installed")))
	}

	pub fn records(&self) -> Vec<ModuleRecord> {
		self.state.read().doc.modules.values().cloned().collect()
	}

	pub fn has_module(&self, module: &str) -> bool {
		self.state.read().doc.modules.contains_key(module)
	}

	pub fn default_bindings(&self) -> DsBindings {
		self.default_bindings.clone()
	}

	/// The storage plugin bound to `(module, ds)`.
	pub fn storage_plugin(&self, module: &str, ds: Datastore) -> Result<Arc<dyn StoragePlugin>> {
		let record = self.record(module)?;
		self.plugins.storage(record.plugins.for_datastore(ds))
	}

	/// The notification plugin bound to `module`, if any.
	pub fn notification_plugin(&self, module: &str) -> Result<Arc<dyn NotificationPlugin>> {
		let record = self.record(module)?;
		match &record.plugins.notification {
			Some(name) => self.plugins.notification(name),
			None => Err(Error::unsupported(format!("module '{module}' has no notification plugin"))),
		}
	}

	#[instrument(name = "registry::install", skip(self, requests), fields(count = requests.len()))]
	pub fn install(&self, requests: Vec<InstallRequest>) -> Result<()> {
		if requests.is_empty() {
			return Err(Error::inval_arg("empty install batch"));
		}
		let mut state = self.state.write();
		for request in &requests {
			if state.doc.modules.contains_key(&request.def.name) {
				return Err(Error::data_exists(format!(
					"module '{}' is already installed",
					request.def.name
				)));
			}
		}

		let mut defs = state.defs.clone();
		let mut doc = state.doc.clone();
		let mut initialise: Vec<(String, DsBindings, DsAccess, Option<DataTree>)> = Vec::new();

		for request in &requests {
			// recursively pull in not-yet-registered implemented imports
			// and includes, inheriting the originating request's
			// bindings and ownership
			let mut queue: Vec<&ModuleDef> = vec![&request.def];
			while let Some(def) = queue.pop() {
				for needed in def.imports.iter().chain(def.includes.iter()) {
					if defs.contains_key(needed)
						|| requests.iter().any(|r| r.def.name == *needed)
					{
						continue;
					}
					let needed_def = request
						.import_defs
						.iter()
						.find(|d| d.name == *needed)
						.ok_or_else(|| {
							Error::schema(format!(
								"module '{}' depends on '{}' which is neither installed nor supplied",
								def.name, needed
							))
						})?;
					debug!(
						"auto-installing '{}' pulled in by '{}'",
						needed_def.name, request.def.name
					);
					defs.insert(needed_def.name.clone(), needed_def.clone());
					doc.modules.insert(
						needed_def.name.clone(),
						new_record(needed_def, request, Vec::new()),
					);
					initialise.push((
						needed_def.name.clone(),
						request.bindings.clone(),
						access_of(request),
						None,
					));
					queue.push(needed_def);
				}
			}

			defs.insert(request.def.name.clone(), request.def.clone());
			doc.modules.insert(
				request.def.name.clone(),
				new_record(&request.def, request, request.features.clone()),
			);
			initialise.push((
				request.def.name.clone(),
				request.bindings.clone(),
				access_of(request),
				request.initial_data.clone(),
			));
		}

		self.finalize(&mut state, doc, defs, |context| {
			for request in &requests {
				if let Some(initial) = &request.initial_data {
					let findings = check_structure(context, initial);
					if !findings.is_empty() {
						return Err(Error::with_items(
							yangstore_type::ErrorCode::ValidationFailed,
							format!("initial data for '{}' is invalid", request.def.name),
							findings,
						));
					}
				}
			}
			Ok(())
		})?;

		// per-plugin data file initialisation runs after the swap; a
		// failure here cannot be rolled back
		for (module, bindings, access, initial) in initialise {
			self.initialise_module(&module, &bindings, &access, initial.as_ref())
				.map_err(|err| Error::internal(format!("data init for '{module}' failed: {err}")))?;
		}
		Ok(())
	}

	#[instrument(name = "registry::remove", skip(self))]
	pub fn remove(&self, modules: &[&str]) -> Result<()> {
		let mut state = self.state.write();
		for module in modules {
			if *module == SELF_MODULE_NAME {
				return Err(Error::unsupported("the self module cannot be removed"));
			}
			let record = state
				.doc
				.modules
				.get(*module)
				.ok_or_else(|| Error::not_found(format!("module '{module}' is not installed")))?;
			for dependant in &record.inverse_deps {
				if !modules.contains(&dependant.as_str()) {
					return Err(Error::operation_failed(format!(
						"module '{module}' is required by '{dependant}'"
					)));
				}
			}
			for def in state.defs.values() {
				let referenced =
					def.imports.iter().chain(def.includes.iter()).any(|i| i == *module);
				if referenced && !modules.contains(&def.name.as_str()) {
					return Err(Error::operation_failed(format!(
						"module '{module}' is required by '{}'",
						def.name
					)));
				}
			}
		}

		let mut defs = state.defs.clone();
		let mut doc = state.doc.clone();
		let mut bindings: Vec<(String, DsBindings)> = Vec::new();
		for module in modules {
			defs.shift_remove(*module);
			if let Some(record) = doc.modules.shift_remove(*module) {
				bindings.push((record.name, record.plugins));
			}
		}

		self.finalize(&mut state, doc, defs, |_| Ok(()))?;

		for (module, binding) in bindings {
			for ds in Datastore::ALL {
				if let Ok(plugin) = self.plugins.storage(binding.for_datastore(ds)) {
					if let Err(err) = plugin.destroy(&module, ds) {
						warn!("discarding data of removed module '{module}' ({ds}): {err}");
					}
				}
			}
			if let Some(name) = &binding.notification {
				if let Ok(plugin) = self.plugins.notification(name) {
					let _ = plugin.destroy(&module);
				}
			}
		}
		Ok(())
	}

	#[instrument(name = "registry::update", skip(self, def), fields(module = %def.name))]
	pub fn update(&self, def: ModuleDef) -> Result<()> {
		let mut state = self.state.write();
		if !state.doc.modules.contains_key(&def.name) {
			return Err(Error::not_found(format!("module '{}' is not installed", def.name)));
		}
		let mut defs = state.defs.clone();
		let mut doc = state.doc.clone();
		doc.modules.get_mut(&def.name).expect("checked above").revision = def.revision.clone();
		// a feature enabled before the update must still exist afterwards
		let record = doc.modules.get(&def.name).expect("checked above");
		for feature in &record.features {
			if !def.features.contains(feature) {
				return Err(Error::inval_arg(format!(
					"updated revision of '{}' drops enabled feature '{}'",
					def.name, feature
				)));
			}
		}
		defs.insert(def.name.clone(), def);
		self.finalize(&mut state, doc, defs, |_| Ok(()))
	}

	#[instrument(name = "registry::enable_feature", skip(self))]
	pub fn enable_feature(&self, module: &str, feature: &str) -> Result<()> {
		self.toggle_feature(module, feature, true)
	}

	#[instrument(name = "registry::disable_feature", skip(self))]
	pub fn disable_feature(&self, module: &str, feature: &str) -> Result<()> {
		self.toggle_feature(module, feature, false)
	}

	fn toggle_feature(&self, module: &str, feature: &str, enable: bool) -> Result<()> {
		let mut state = self.state.write();
		let def = state
			.defs
			.get(module)
			.ok_or_else(|| Error::not_found(format!("module '{module}' is not installed")))?;
		if enable && !def.features.iter().any(|f| f == feature) {
			return Err(Error::inval_arg(format!(
				"module '{module}' does not declare feature '{feature}'"
			)));
		}
		let mut doc = state.doc.clone();
		let record = doc.modules.get_mut(module).expect("defs and doc stay in sync");
		let enabled = record.features.iter().any(|f| f == feature);
		if enable == enabled {
			return Ok(());
		}
		if enable {
			record.features.push(feature.to_string());
		} else {
			record.features.retain(|f| f != feature);
		}
		let defs = state.defs.clone();
		self.finalize(&mut state, doc, defs, |_| Ok(()))
	}

	/// Toggle replay support for one module, or every module with a
	/// notification binding when `module` is `None`.
	#[instrument(name = "registry::set_replay", skip(self))]
	pub fn set_replay_support(&self, module: Option<&str>, enable: bool) -> Result<()> {
		let mut state = self.state.write();
		let targets: Vec<String> = match module {
			Some(name) => {
				let record = state
					.doc
					.modules
					.get(name)
					.ok_or_else(|| Error::not_found(format!("module '{name}' is not installed")))?;
				if enable && record.plugins.notification.is_none() {
					return Err(Error::unsupported(format!(
						"module '{name}' has no notification plugin"
					)));
				}
				vec![name.to_string()]
			}
			None => state
				.doc
				.modules
				.values()
				.filter(|r| r.plugins.notification.is_some())
				.map(|r| r.name.clone())
				.collect(),
		};

		let mut doc = state.doc.clone();
		for target in targets {
			let record = doc.modules.get_mut(&target).expect("targets come from the document");
			if enable {
				let plugin = record
					.plugins
					.notification
					.as_deref()
					.map(|name| self.plugins.notification(name))
					.transpose()?;
				let earliest = plugin
					.and_then(|p| p.earliest(&target).ok().flatten())
					.filter(|ts| !ts.is_zero())
					.unwrap_or_else(Timestamp::now);
				record.replay = Some(ReplaySupport {
					earliest,
				});
			} else {
				record.replay = None;
			}
		}
		let defs = state.defs.clone();
		self.finalize(&mut state, doc, defs, |_| Ok(()))
	}

	pub fn get_module_ds_access(&self, module: &str, ds: Datastore) -> Result<DsAccess> {
		self.storage_plugin(module, ds)?.get_access(module, ds)
	}

	pub fn set_module_ds_access(&self, module: &str, ds: Datastore, access: &DsAccess) -> Result<()> {
		self.storage_plugin(module, ds)?.set_access(module, ds, access)
	}

	pub fn check_module_ds_access(
		&self,
		module: &str,
		ds: Datastore,
		identity: &Identity,
		write: bool,
	) -> Result<bool> {
		self.storage_plugin(module, ds)?.check_access(module, ds, identity, write)
	}

	/// The shared tail of every lifecycle transaction. `pre_persist` runs
	/// against the tentative context before anything is written, so caller
	/// errors still leave the registry untouched.
	fn finalize(
		&self,
		state: &mut State,
		mut doc: RegistryDoc,
		defs: IndexMap<String, ModuleDef>,
		pre_persist: impl FnOnce(&SchemaContext) -> Result<()>,
	) -> Result<()> {
		let mut features: IndexMap<String, Vec<String>> = IndexMap::new();
		for record in doc.modules.values() {
			features.insert(record.name.clone(), record.features.clone());
		}
		let def_list: Vec<ModuleDef> = defs.values().cloned().collect();
		let context = SchemaContext::compile(&def_list, &features)?;

		for record in doc.modules.values_mut() {
			let module = context
				.module(&record.name)
				.ok_or_else(|| Error::internal(format!("module '{}' vanished during compile", record.name)))?;
			let analysis = analyze(module)?;
			record.deps = analysis.data;
			record.op_deps = analysis.ops;
		}
		doc.rebuild_inverse_deps();
		doc.content_id = state.doc.content_id + 1;

		pre_persist(&context)?;

		let tree = doc.to_tree(SELF_MODULE_NAME);
		let findings = check_structure(&context, &tree);
		if !findings.is_empty() {
			return Err(Error::with_items(
				yangstore_type::ErrorCode::Internal,
				"registry document does not match the self module schema",
				findings,
			));
		}

		let self_record = doc.modules.get(SELF_MODULE_NAME).ok_or_else(|| {
			Error::internal("registry document lost its self module record")
		})?;
		let startup = self.plugins.storage(&self_record.plugins.startup)?;
		startup.store(SELF_MODULE_NAME, Datastore::Startup, &tree)?;

		debug!(content_id = doc.content_id, modules = doc.modules.len(), "registry committed");
		state.doc = doc;
		state.defs = defs;
		state.context = Arc::new(context);
		Ok(())
	}

	fn initialise_module(
		&self,
		module: &str,
		bindings: &DsBindings,
		access: &DsAccess,
		initial: Option<&DataTree>,
	) -> Result<()> {
		for ds in Datastore::ALL {
			let plugin = self.plugins.storage(bindings.for_datastore(ds))?;
			plugin.init(module, ds, initial)?;
			plugin.set_access(module, ds, access)?;
		}
		Ok(())
	}
}

fn new_record(def: &ModuleDef, request: &InstallRequest, features: Vec<String>) -> ModuleRecord {
	ModuleRecord {
		name: def.name.clone(),
		revision: def.revision.clone(),
		features,
		plugins: request.bindings.clone(),
		replay: None,
		owner: request.owner.clone(),
		group: request.group.clone(),
		perm: request.perm,
		deps: Vec::new(),
		op_deps: Vec::new(),
		inverse_deps: Vec::new(),
	}
}

fn access_of(request: &InstallRequest) -> DsAccess {
	DsAccess {
		owner: request.owner.clone(),
		group: request.group.clone(),
		perm: request.perm,
	}
}

/// Recover the content-id of a previously persisted registry document.
fn persisted_content_id(tree: &DataTree) -> u64 {
	tree.roots
		.iter()
		.find(|n| n.name == "content-id")
		.and_then(|n| match &n.value {
			Some(Value::Uint64(id)) => Some(*id),
			_ => None,
		})
		.unwrap_or(0)
}

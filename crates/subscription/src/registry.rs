// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The subscription registry.
//!
//! Reader-mostly: dispatch takes a shared lock and clones the relevant
//! entries out, so callbacks never run under the registry lock. A subscriber
//! reported dead by the transport is flagged and swept on the next write
//! operation; dispatch treats flagged entries as already gone.

use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::RwLock;
use tracing::debug;
use yangstore_core::{interface::Datastore, path::DataPath, tree::DataTree};
use yangstore_type::Error;

use crate::{
	Result,
	event::{EventMask, ModuleChangeEvent, NotificationEvent},
};

/// Handle to one registered subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub type ModuleChangeCallback = Arc<dyn Fn(&ModuleChangeEvent) -> Result<()> + Send + Sync>;
pub type OperProviderCallback = Arc<dyn Fn(&DataPath) -> Result<DataTree> + Send + Sync>;
/// Receives the concrete invocation path (with key predicates) plus the
/// validated input tree; returns the output tree.
pub type RpcCallback = Arc<dyn Fn(&DataPath, &DataTree) -> Result<DataTree> + Send + Sync>;
pub type NotificationCallback = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

struct ModuleChangeSub {
	id: SubscriptionId,
	module: String,
	datastore: Datastore,
	xpath: Option<DataPath>,
	priority: u32,
	mask: EventMask,
	callback: ModuleChangeCallback,
	dead: Arc<AtomicBool>,
}

struct OperSub {
	id: SubscriptionId,
	module: String,
	xpath: DataPath,
	callback: OperProviderCallback,
	dead: Arc<AtomicBool>,
}

struct RpcSub {
	id: SubscriptionId,
	path: DataPath,
	callback: RpcCallback,
	dead: Arc<AtomicBool>,
}

struct NotifSub {
	id: SubscriptionId,
	module: String,
	xpath: Option<DataPath>,
	callback: NotificationCallback,
	dead: Arc<AtomicBool>,
}

/// One module-change subscriber as seen by the dispatch loop.
#[derive(Clone)]
pub struct ChangeDispatchEntry {
	pub id: SubscriptionId,
	pub module: String,
	pub priority: u32,
	pub mask: EventMask,
	pub xpath: Option<DataPath>,
	pub callback: ModuleChangeCallback,
	pub dead: Arc<AtomicBool>,
}

/// One operational pull provider as seen by the composer.
#[derive(Clone)]
pub struct OperProviderEntry {
	pub id: SubscriptionId,
	pub xpath: DataPath,
	pub callback: OperProviderCallback,
	pub dead: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inner {
	module_change: Vec<ModuleChangeSub>,
	oper: Vec<OperSub>,
	rpc: Vec<RpcSub>,
	notification: Vec<NotifSub>,
}

/// The shared subscription registry.
#[derive(Default)]
pub struct SubscriptionRegistry {
	inner: RwLock<Inner>,
	next_id: AtomicU64,
}

impl SubscriptionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	fn next_id(&self) -> SubscriptionId {
		SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
	}

	pub fn subscribe_module_change(
		&self,
		module: impl Into<String>,
		datastore: Datastore,
		xpath: Option<DataPath>,
		priority: u32,
		mask: EventMask,
		callback: ModuleChangeCallback,
	) -> SubscriptionId {
		let id = self.next_id();
		self.inner.write().module_change.push(ModuleChangeSub {
			id,
			module: module.into(),
			datastore,
			xpath,
			priority,
			mask,
			callback,
			dead: Arc::new(AtomicBool::new(false)),
		});
		id
	}

	pub fn subscribe_oper(
		&self,
		module: impl Into<String>,
		xpath: DataPath,
		callback: OperProviderCallback,
	) -> SubscriptionId {
		let id = self.next_id();
		self.inner.write().oper.push(OperSub {
			id,
			module: module.into(),
			xpath,
			callback,
			dead: Arc::new(AtomicBool::new(false)),
		});
		id
	}

	/// Register an rpc/action handler. At most one live handler per path.
	pub fn subscribe_rpc(&self, path: DataPath, callback: RpcCallback) -> Result<SubscriptionId> {
		let mut inner = self.inner.write();
		sweep(&mut inner);
		if inner.rpc.iter().any(|sub| paths_equal_ignoring_keys(&sub.path, &path)) {
			return Err(Error::data_exists(format!("an rpc handler for '{path}' already exists")));
		}
		let id = self.next_id();
		inner.rpc.push(RpcSub {
			id,
			path,
			callback,
			dead: Arc::new(AtomicBool::new(false)),
		});
		Ok(id)
	}

	pub fn subscribe_notification(
		&self,
		module: impl Into<String>,
		xpath: Option<DataPath>,
		callback: NotificationCallback,
	) -> SubscriptionId {
		let id = self.next_id();
		self.inner.write().notification.push(NotifSub {
			id,
			module: module.into(),
			xpath,
			callback,
			dead: Arc::new(AtomicBool::new(false)),
		});
		id
	}

	pub fn unsubscribe(&self, id: SubscriptionId) {
		let mut inner = self.inner.write();
		inner.module_change.retain(|s| s.id != id);
		inner.oper.retain(|s| s.id != id);
		inner.rpc.retain(|s| s.id != id);
		inner.notification.retain(|s| s.id != id);
	}

	/// Flag a subscriber whose transport died. Its entries stop receiving
	/// events immediately and are swept on the next write.
	pub fn mark_dead(&self, id: SubscriptionId) {
		let inner = self.inner.read();
		for dead in inner
			.module_change
			.iter()
			.filter(|s| s.id == id)
			.map(|s| &s.dead)
			.chain(inner.oper.iter().filter(|s| s.id == id).map(|s| &s.dead))
			.chain(inner.rpc.iter().filter(|s| s.id == id).map(|s| &s.dead))
			.chain(inner.notification.iter().filter(|s| s.id == id).map(|s| &s.dead))
		{
			dead.store(true, Ordering::Relaxed);
		}
		debug!(id = id.0, "subscription marked dead");
	}

	/// Module-change subscribers touching any of `modules`, ordered for
	/// dispatch: descending priority, then module name, then registration
	/// order.
	pub fn change_subscribers(&self, modules: &[String], datastore: Datastore) -> Vec<ChangeDispatchEntry> {
		let inner = self.inner.read();
		let mut out: Vec<ChangeDispatchEntry> = inner
			.module_change
			.iter()
			.filter(|sub| {
				sub.datastore == datastore
					&& modules.contains(&sub.module)
					&& !sub.dead.load(Ordering::Relaxed)
			})
			.map(|sub| ChangeDispatchEntry {
				id: sub.id,
				module: sub.module.clone(),
				priority: sub.priority,
				mask: sub.mask,
				xpath: sub.xpath.clone(),
				callback: sub.callback.clone(),
				dead: sub.dead.clone(),
			})
			.collect();
		out.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.module.cmp(&b.module)));
		out
	}

	/// Whether any live subscriber listens for changes of `module` on
	/// `datastore`.
	pub fn has_change_subscriber(&self, module: &str, datastore: Datastore) -> bool {
		self.inner
			.read()
			.module_change
			.iter()
			.any(|s| s.module == module && s.datastore == datastore && !s.dead.load(Ordering::Relaxed))
	}

	/// Pull providers of `module` in registration order.
	pub fn oper_providers(&self, module: &str) -> Vec<OperProviderEntry> {
		self.inner
			.read()
			.oper
			.iter()
			.filter(|sub| sub.module == module && !sub.dead.load(Ordering::Relaxed))
			.map(|sub| OperProviderEntry {
				id: sub.id,
				xpath: sub.xpath.clone(),
				callback: sub.callback.clone(),
				dead: sub.dead.clone(),
			})
			.collect()
	}

	/// The handler for an rpc/action invocation path, matched on names
	/// (key predicates of the invocation are ignored).
	pub fn rpc_handler(&self, path: &DataPath) -> Option<(SubscriptionId, RpcCallback)> {
		self.inner
			.read()
			.rpc
			.iter()
			.find(|sub| !sub.dead.load(Ordering::Relaxed) && paths_equal_ignoring_keys(&sub.path, path))
			.map(|sub| (sub.id, sub.callback.clone()))
	}

	/// Notification subscribers of `module` whose filter matches the
	/// notification's top node.
	pub fn notification_subscribers(&self, module: &str, top: &str) -> Vec<(SubscriptionId, NotificationCallback)> {
		self.inner
			.read()
			.notification
			.iter()
			.filter(|sub| {
				sub.module == module
					&& !sub.dead.load(Ordering::Relaxed)
					&& sub.xpath.as_ref().is_none_or(|p| p.last().name == top || p.is_wildcard())
			})
			.map(|sub| (sub.id, sub.callback.clone()))
			.collect()
	}

	/// Drop flagged entries.
	pub fn collect_dead(&self) {
		sweep(&mut self.inner.write());
	}
}

fn sweep(inner: &mut Inner) {
	inner.module_change.retain(|s| !s.dead.load(Ordering::Relaxed));
	inner.oper.retain(|s| !s.dead.load(Ordering::Relaxed));
	inner.rpc.retain(|s| !s.dead.load(Ordering::Relaxed));
	inner.notification.retain(|s| !s.dead.load(Ordering::Relaxed));
}

/// Segment-wise name/module equality, ignoring key and position predicates.
fn paths_equal_ignoring_keys(a: &DataPath, b: &DataPath) -> bool {
	a.segments.len() == b.segments.len()
		&& a.segments.iter().zip(&b.segments).all(|(x, y)| x.name == y.name && x.module == y.module)
}

#[cfg(test)]
mod test {
	use super::*;

	fn path(text: &str) -> DataPath {
		DataPath::parse(text).unwrap()
	}

	#[test]
	fn test_change_dispatch_order() {
		let registry = SubscriptionRegistry::new();
		let nop: ModuleChangeCallback = Arc::new(|_| Ok(()));
		let low =
			registry.subscribe_module_change("b", Datastore::Running, None, 1, EventMask::all(), nop.clone());
		let high =
			registry.subscribe_module_change("b", Datastore::Running, None, 9, EventMask::all(), nop.clone());
		let high_a =
			registry.subscribe_module_change("a", Datastore::Running, None, 9, EventMask::all(), nop.clone());
		let same_prio_later =
			registry.subscribe_module_change("b", Datastore::Running, None, 9, EventMask::all(), nop);

		let plan = registry.change_subscribers(&["a".to_string(), "b".to_string()], Datastore::Running);
		let ids: Vec<SubscriptionId> = plan.iter().map(|e| e.id).collect();
		// priority desc, then module name, then registration order
		assert_eq!(ids, vec![high_a, high, same_prio_later, low]);
	}

	#[test]
	fn test_datastore_filter() {
		let registry = SubscriptionRegistry::new();
		let nop: ModuleChangeCallback = Arc::new(|_| Ok(()));
		registry.subscribe_module_change("m", Datastore::Startup, None, 0, EventMask::all(), nop);
		assert!(registry.change_subscribers(&["m".to_string()], Datastore::Running).is_empty());
		assert!(registry.has_change_subscriber("m", Datastore::Startup));
	}

	#[test]
	fn test_rpc_handler_unique_per_path() {
		let registry = SubscriptionRegistry::new();
		let cb: RpcCallback = Arc::new(|_, _| Ok(DataTree::new("m")));
		registry.subscribe_rpc(path("/m:reset"), cb.clone()).unwrap();
		let err = registry.subscribe_rpc(path("/m:reset"), cb.clone()).unwrap_err();
		assert_eq!(err.code, yangstore_type::ErrorCode::DataExists);

		// a keyed invocation path still resolves to the handler
		registry.subscribe_rpc(path("/m:cont/list/act"), cb).unwrap();
		assert!(registry.rpc_handler(&path("/m:cont/list[id='7']/act")).is_some());
	}

	#[test]
	fn test_dead_subscribers_disappear() {
		let registry = SubscriptionRegistry::new();
		let nop: ModuleChangeCallback = Arc::new(|_| Ok(()));
		let id = registry.subscribe_module_change("m", Datastore::Running, None, 0, EventMask::all(), nop);
		assert_eq!(registry.change_subscribers(&["m".to_string()], Datastore::Running).len(), 1);

		registry.mark_dead(id);
		assert!(registry.change_subscribers(&["m".to_string()], Datastore::Running).is_empty());
		registry.collect_dead();
		assert!(!registry.has_change_subscriber("m", Datastore::Running));
	}

	#[test]
	fn test_notification_filter_matches_top_node() {
		let registry = SubscriptionRegistry::new();
		let cb: NotificationCallback = Arc::new(|_| {});
		registry.subscribe_notification("m", Some(path("/m:link-down")), cb.clone());
		registry.subscribe_notification("m", None, cb);

		assert_eq!(registry.notification_subscribers("m", "link-down").len(), 2);
		assert_eq!(registry.notification_subscribers("m", "link-up").len(), 1);
	}
}

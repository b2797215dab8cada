// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The change transaction pipeline.
//!
//! `apply_changes` drives one session's pending edits through
//! lock → validate → diff → CHANGE → persist → DONE. A veto or a persist
//! failure unwinds with ABORT deliveries to every already-notified
//! subscriber, in reverse order, and leaves the datastore untouched. DONE
//! failures are logged and never propagate.

use std::time::Duration;

use tracing::{debug, instrument, warn};
use yangstore_core::{
	change::Change,
	interface::{Datastore, SessionId},
	path::DataPath,
	tree::DataTree,
};
use yangstore_schema::SchemaContext;
use yangstore_subscription::{
	ChangeDispatchEntry, EventKind, ModuleChangeEvent, SubscriptionRegistry, call_with_timeout,
};
use yangstore_type::{Error, ErrorCode};

use crate::{Result, diff::diff_module, lock::LockManager, validate::{DataAccess, validate_module}};

/// One module's part of a commit: the persisted baseline and the session's
/// working copy.
pub struct ModuleCommit {
	pub module: String,
	pub baseline: DataTree,
	pub working: DataTree,
}

#[derive(Clone, Copy, Debug)]
pub struct CommitSettings {
	pub lock_timeout: Duration,
	pub callback_timeout: Duration,
}

impl Default for CommitSettings {
	fn default() -> Self {
		Self {
			lock_timeout: Duration::from_secs(10),
			callback_timeout: Duration::from_secs(5),
		}
	}
}

/// What a successful commit produced.
#[derive(Debug, Default)]
pub struct CommitOutcome {
	/// Ordered change lists per touched module (empty lists are dropped).
	pub changes: Vec<(String, Vec<Change>)>,
	/// The trees that were persisted, defaults materialised.
	pub stored: Vec<(String, DataTree)>,
}

/// Commit a session's working copies.
#[instrument(
	name = "transaction::apply_changes",
	skip(ctx, locks, subs, modules, access, persist, settings),
	fields(%session, %datastore, modules = modules.len())
)]
pub fn apply_changes(
	ctx: &SchemaContext,
	locks: &LockManager,
	subs: &SubscriptionRegistry,
	session: SessionId,
	datastore: Datastore,
	mut modules: Vec<ModuleCommit>,
	access: &dyn DataAccess,
	persist: &dyn Fn(&str, &DataTree) -> Result<()>,
	settings: &CommitSettings,
) -> Result<CommitOutcome> {
	let names: Vec<String> = modules.iter().map(|m| m.module.clone()).collect();
	locks.acquire_all(session, &names, datastore, settings.lock_timeout)?;
	let result = commit_locked(ctx, subs, session, datastore, &mut modules, access, persist, settings);
	locks.release_all(session, &names, datastore);
	result
}

#[allow(clippy::too_many_arguments)]
fn commit_locked(
	ctx: &SchemaContext,
	subs: &SubscriptionRegistry,
	session: SessionId,
	datastore: Datastore,
	modules: &mut [ModuleCommit],
	access: &dyn DataAccess,
	persist: &dyn Fn(&str, &DataTree) -> Result<()>,
	settings: &CommitSettings,
) -> Result<CommitOutcome> {
	// validation materialises defaults into the working copies
	for commit in modules.iter_mut() {
		validate_module(ctx, &mut commit.working, access)?;
	}

	let mut changes: Vec<(String, Vec<Change>)> = Vec::new();
	for commit in modules.iter() {
		let module = ctx.get_module(&commit.module)?;
		let list = diff_module(module, &commit.baseline, &commit.working)?;
		if !list.is_empty() {
			changes.push((commit.module.clone(), list));
		}
	}
	if changes.is_empty() {
		debug!("no effective changes, nothing to commit");
		return Ok(CommitOutcome::default());
	}

	let touched: Vec<String> = changes.iter().map(|(m, _)| m.clone()).collect();
	let plan = subs.change_subscribers(&touched, datastore);

	// CHANGE phase: descending priority, veto aborts
	let mut notified: Vec<(&ChangeDispatchEntry, Vec<Change>)> = Vec::new();
	for entry in &plan {
		if !entry.mask.contains(EventKind::Change) {
			continue;
		}
		let Some(filtered) = filtered_changes(&changes, entry) else {
			continue;
		};
		let event = ModuleChangeEvent {
			kind: EventKind::Change,
			module: entry.module.clone(),
			datastore,
			session,
			changes: filtered.clone(),
		};
		let callback = entry.callback.clone();
		let verdict = call_with_timeout(settings.callback_timeout, move || callback(&event));
		let veto = match verdict {
			Ok(Ok(())) => None,
			Ok(Err(err)) => Some(Error::with_items(
				ErrorCode::CallbackFailed,
				format!("subscriber vetoed changes of '{}': {}", entry.module, err.message),
				err.items,
			)),
			Err(err) => {
				// timeout or panic: the subscriber is gone
				entry.dead.store(true, std::sync::atomic::Ordering::Relaxed);
				Some(err)
			}
		};
		if let Some(err) = veto {
			abort_notified(subs, session, datastore, &notified, settings);
			return Err(err);
		}
		notified.push((entry, filtered));
	}

	// persist phase
	for commit in modules.iter() {
		if !touched.contains(&commit.module) {
			continue;
		}
		if let Err(err) = persist(&commit.module, &commit.working) {
			warn!("persist of '{}' failed, aborting: {err}", commit.module);
			abort_notified(subs, session, datastore, &notified, settings);
			return Err(err);
		}
	}

	// DONE phase, best effort
	for entry in &plan {
		if !entry.mask.contains(EventKind::Done) {
			continue;
		}
		let Some(filtered) = filtered_changes(&changes, entry) else {
			continue;
		};
		let event = ModuleChangeEvent {
			kind: EventKind::Done,
			module: entry.module.clone(),
			datastore,
			session,
			changes: filtered,
		};
		let callback = entry.callback.clone();
		if let Err(err) = call_with_timeout(settings.callback_timeout, move || callback(&event)) {
			warn!("done notification for '{}' failed: {err}", entry.module);
		}
	}

	subs.collect_dead();
	Ok(CommitOutcome {
		changes,
		stored: modules.iter().map(|m| (m.module.clone(), m.working.clone())).collect(),
	})
}

/// Deliver ABORT to already-notified subscribers, newest first.
fn abort_notified(
	subs: &SubscriptionRegistry,
	session: SessionId,
	datastore: Datastore,
	notified: &[(&ChangeDispatchEntry, Vec<Change>)],
	settings: &CommitSettings,
) {
	for (entry, filtered) in notified.iter().rev() {
		if !entry.mask.contains(EventKind::Abort) {
			continue;
		}
		let event = ModuleChangeEvent {
			kind: EventKind::Abort,
			module: entry.module.clone(),
			datastore,
			session,
			changes: filtered.clone(),
		};
		let callback = entry.callback.clone();
		if let Err(err) = call_with_timeout(settings.callback_timeout, move || callback(&event)) {
			warn!("abort notification for '{}' failed: {err}", entry.module);
		}
	}
	subs.collect_dead();
}

/// The subscriber's view of the change list: its module only, narrowed by
/// its xpath filter. `None` when nothing matches.
fn filtered_changes(changes: &[(String, Vec<Change>)], entry: &ChangeDispatchEntry) -> Option<Vec<Change>> {
	let (_, list) = changes.iter().find(|(module, _)| *module == entry.module)?;
	let filtered: Vec<Change> = match &entry.xpath {
		None => list.clone(),
		Some(filter) => list.iter().filter(|c| path_under(&c.path, filter)).cloned().collect(),
	};
	if filtered.is_empty() {
		None
	} else {
		Some(filtered)
	}
}

/// Whether `path` equals `filter` or lies beneath it. Key predicates present
/// in the filter must match; missing ones are wildcards.
fn path_under(path: &DataPath, filter: &DataPath) -> bool {
	if filter.segments.len() > path.segments.len() {
		return false;
	}
	filter.segments.iter().zip(&path.segments).all(|(f, p)| {
		f.name == p.name
			&& (f.module.is_none() || f.module == p.module)
			&& f.keys.iter().all(|fk| p.keys.contains(fk))
	})
}

#[cfg(test)]
mod test {
	use std::{
		collections::HashMap,
		sync::{Arc, Mutex},
	};

	use indexmap::IndexMap;
	use yangstore_core::tree::DataNode;
	use yangstore_subscription::EventMask;
	use yangstore_testing::modules::solo_module;
	use yangstore_type::Value;

	use super::*;

	const SESSION: SessionId = SessionId(7);

	fn ctx() -> SchemaContext {
		SchemaContext::compile(&[solo_module()], &IndexMap::new()).unwrap()
	}

	fn tree_with_label(label: &str) -> DataTree {
		let mut tree = DataTree::new("solo");
		tree.roots.push(
			DataNode::container("solo", "box")
				.with_child(DataNode::leaf("solo", "label", Value::Text(label.into()))),
		);
		tree
	}

	struct Fixture {
		ctx: SchemaContext,
		locks: LockManager,
		subs: SubscriptionRegistry,
		store: Arc<Mutex<HashMap<String, DataTree>>>,
	}

	impl Fixture {
		fn new() -> Self {
			Self {
				ctx: ctx(),
				locks: LockManager::new(),
				subs: SubscriptionRegistry::new(),
				store: Arc::new(Mutex::new(HashMap::new())),
			}
		}

		fn commit(&self, baseline: DataTree, working: DataTree) -> Result<CommitOutcome> {
			let store = self.store.clone();
			let persist = move |module: &str, tree: &DataTree| {
				store.lock().unwrap().insert(module.to_string(), tree.clone());
				Ok(())
			};
			let access = |module: &str| -> Result<DataTree> { Ok(DataTree::new(module)) };
			apply_changes(
				&self.ctx,
				&self.locks,
				&self.subs,
				SESSION,
				Datastore::Running,
				vec![ModuleCommit {
					module: "solo".to_string(),
					baseline,
					working,
				}],
				&access,
				&persist,
				&CommitSettings::default(),
			)
		}
	}

	#[test]
	fn test_commit_persists_and_reports_changes() {
		let fixture = Fixture::new();
		let outcome = fixture.commit(DataTree::new("solo"), tree_with_label("a")).unwrap();
		assert_eq!(outcome.changes.len(), 1);
		assert!(fixture.store.lock().unwrap().contains_key("solo"));

		// post-commit equality: the stored tree is the working copy
		let stored = fixture.store.lock().unwrap().get("solo").cloned().unwrap();
		assert!(stored.data_eq(&tree_with_label("a")));
	}

	#[test]
	fn test_empty_diff_commits_nothing() {
		let fixture = Fixture::new();
		let outcome = fixture.commit(tree_with_label("a"), tree_with_label("a")).unwrap();
		assert!(outcome.changes.is_empty());
		assert!(fixture.store.lock().unwrap().is_empty());
	}

	#[test]
	fn test_subscriber_sequence_change_then_done() {
		let fixture = Fixture::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		let seen = log.clone();
		fixture.subs.subscribe_module_change(
			"solo",
			Datastore::Running,
			None,
			0,
			EventMask::all(),
			Arc::new(move |event| {
				seen.lock().unwrap().push((event.kind, event.changes.len()));
				Ok(())
			}),
		);

		fixture.commit(DataTree::new("solo"), tree_with_label("a")).unwrap();
		let events = log.lock().unwrap().clone();
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].0, EventKind::Change);
		assert_eq!(events[1].0, EventKind::Done);
		assert_eq!(events[0].1, events[1].1);
	}

	#[test]
	fn test_veto_aborts_in_reverse_order() {
		let fixture = Fixture::new();
		let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

		let seen = log.clone();
		fixture.subs.subscribe_module_change(
			"solo",
			Datastore::Running,
			None,
			9,
			EventMask::all(),
			Arc::new(move |event| {
				seen.lock().unwrap().push(format!("first:{}", event.kind));
				Ok(())
			}),
		);
		let seen = log.clone();
		fixture.subs.subscribe_module_change(
			"solo",
			Datastore::Running,
			None,
			5,
			EventMask::all(),
			Arc::new(move |event| {
				seen.lock().unwrap().push(format!("second:{}", event.kind));
				Ok(())
			}),
		);
		fixture.subs.subscribe_module_change(
			"solo",
			Datastore::Running,
			None,
			1,
			EventMask::all(),
			Arc::new(|_| Err(Error::operation_failed("rejected by policy"))),
		);

		let err = fixture.commit(DataTree::new("solo"), tree_with_label("a")).unwrap_err();
		assert_eq!(err.code, ErrorCode::CallbackFailed);
		assert!(err.message.contains("rejected by policy"));

		// abort atomicity: nothing persisted
		assert!(fixture.store.lock().unwrap().is_empty());

		// aborts run newest-notified first
		let events = log.lock().unwrap().clone();
		assert_eq!(events, vec![
			"first:change".to_string(),
			"second:change".to_string(),
			"second:abort".to_string(),
			"first:abort".to_string(),
		]);
	}

	#[test]
	fn test_persist_failure_aborts_subscribers() {
		let fixture = Fixture::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		let seen = log.clone();
		fixture.subs.subscribe_module_change(
			"solo",
			Datastore::Running,
			None,
			0,
			EventMask::all(),
			Arc::new(move |event| {
				seen.lock().unwrap().push(event.kind);
				Ok(())
			}),
		);

		let access = |module: &str| -> Result<DataTree> { Ok(DataTree::new(module)) };
		let persist = |_: &str, _: &DataTree| Err(Error::sys("disk full"));
		let err = apply_changes(
			&fixture.ctx,
			&fixture.locks,
			&fixture.subs,
			SESSION,
			Datastore::Running,
			vec![ModuleCommit {
				module: "solo".to_string(),
				baseline: DataTree::new("solo"),
				working: tree_with_label("a"),
			}],
			&access,
			&persist,
			&CommitSettings::default(),
		)
		.unwrap_err();
		assert_eq!(err.code, ErrorCode::Sys);
		assert_eq!(*log.lock().unwrap(), vec![EventKind::Change, EventKind::Abort]);
	}

	#[test]
	fn test_xpath_filter_narrows_changes() {
		let fixture = Fixture::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		let seen = log.clone();
		fixture.subs.subscribe_module_change(
			"solo",
			Datastore::Running,
			Some(DataPath::parse("/solo:box/label").unwrap()),
			0,
			EventMask::all(),
			Arc::new(move |event| {
				seen.lock().unwrap().extend(event.changes.iter().map(|c| c.path.to_string()));
				Ok(())
			}),
		);

		// change label and add an item entry; the filter sees only label
		let mut working = tree_with_label("b");
		working.roots[0].children.push(
			DataNode::container("solo", "item")
				.with_child(DataNode::leaf("solo", "id", Value::Uint32(1))),
		);
		fixture.commit(tree_with_label("a"), working).unwrap();

		let paths = log.lock().unwrap().clone();
		let changed: Vec<&String> =
			paths.iter().filter(|p| p.as_str() == "/solo:box/label").collect();
		assert_eq!(changed.len(), 2, "change + done deliveries");
		assert_eq!(paths.len(), 2, "item changes filtered out");
	}

	#[test]
	fn test_validation_failure_blocks_commit() {
		let fixture = Fixture::new();
		let mut working = DataTree::new("solo");
		working.roots.push(DataNode::leaf("solo", "bogus", Value::Bool(true)));
		let err = fixture.commit(DataTree::new("solo"), working).unwrap_err();
		assert_eq!(err.code, ErrorCode::ValidationFailed);
		assert!(fixture.store.lock().unwrap().is_empty());

		// the failed commit released its locks
		fixture.commit(DataTree::new("solo"), tree_with_label("ok")).unwrap();
	}

	#[test]
	fn test_timed_out_subscriber_aborts_and_is_collected() {
		let fixture = Fixture::new();
		fixture.subs.subscribe_module_change(
			"solo",
			Datastore::Running,
			None,
			0,
			EventMask::all(),
			Arc::new(|_| {
				std::thread::sleep(Duration::from_secs(60));
				Ok(())
			}),
		);

		let store = fixture.store.clone();
		let persist = move |module: &str, tree: &DataTree| {
			store.lock().unwrap().insert(module.to_string(), tree.clone());
			Ok(())
		};
		let access = |module: &str| -> Result<DataTree> { Ok(DataTree::new(module)) };
		let err = apply_changes(
			&fixture.ctx,
			&fixture.locks,
			&fixture.subs,
			SESSION,
			Datastore::Running,
			vec![ModuleCommit {
				module: "solo".to_string(),
				baseline: DataTree::new("solo"),
				working: tree_with_label("a"),
			}],
			&access,
			&persist,
			&CommitSettings {
				lock_timeout: Duration::from_millis(200),
				callback_timeout: Duration::from_millis(50),
			},
		)
		.unwrap_err();
		assert_eq!(err.code, ErrorCode::Timeout);
		assert!(fixture.store.lock().unwrap().is_empty());

		// the dead subscriber was garbage-collected
		assert!(!fixture.subs.has_change_subscriber("solo", Datastore::Running));
	}
}

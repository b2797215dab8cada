// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! RPC dispatch and notification delivery with replay.

use std::sync::{Arc, Mutex};

use yangstore_core::{
	interface::{Datastore, Identity, Timestamp},
	tree::{DataNode, DataTree},
};
use yangstore_engine::test_utils::{create_test_engine, memory_bindings};
use yangstore_registry::InstallRequest;
use yangstore_subscription::NotificationKind;
use yangstore_testing::modules::{interfaces_module, plugin_module};
use yangstore_type::{ErrorCode, Value};

fn rpc_input(name: &str) -> DataTree {
	let mut tree = DataTree::new("ietf-interfaces");
	tree.roots.push(DataNode::leaf("ietf-interfaces", "name", Value::Text(name.into())));
	tree
}

fn notification(name: &str, up: bool) -> DataTree {
	let mut tree = DataTree::new("ietf-interfaces");
	tree.roots.push(
		DataNode::container("ietf-interfaces", "link-state-change")
			.with_child(DataNode::leaf("ietf-interfaces", "if-name", Value::Text(name.into())))
			.with_child(DataNode::leaf("ietf-interfaces", "up", Value::Bool(up))),
	);
	tree
}

#[test]
fn test_rpc_round_trip() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();

	engine
		.subscribe_rpc(
			"/ietf-interfaces:reset-interface",
			Arc::new(|_, input| {
				let name = input.roots[0].value.clone().unwrap().to_string();
				let mut output = DataTree::new("ietf-interfaces");
				output.roots.push(DataNode::leaf(
					"ietf-interfaces",
					"took-ms",
					Value::Uint32(name.len() as u32),
				));
				Ok(output)
			}),
		)
		.unwrap();

	let output = engine.send_rpc("/ietf-interfaces:reset-interface", rpc_input("eth0")).unwrap();
	assert_eq!(output.roots[0].value, Some(Value::Uint32(4)));
}

#[test]
fn test_rpc_without_handler_is_unsupported() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();
	let err = engine.send_rpc("/ietf-interfaces:reset-interface", rpc_input("eth0")).unwrap_err();
	assert_eq!(err.code, ErrorCode::Unsupported);
}

#[test]
fn test_rpc_input_validated() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();
	engine
		.subscribe_rpc("/ietf-interfaces:reset-interface", Arc::new(|_, _| Ok(DataTree::new("ietf-interfaces"))))
		.unwrap();

	let mut bad = DataTree::new("ietf-interfaces");
	bad.roots.push(DataNode::leaf("ietf-interfaces", "bogus", Value::Bool(true)));
	let err = engine.send_rpc("/ietf-interfaces:reset-interface", bad).unwrap_err();
	assert_eq!(err.code, ErrorCode::ValidationFailed);
}

#[test]
fn test_rpc_handler_error_propagates_items() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();
	engine
		.subscribe_rpc(
			"/ietf-interfaces:reset-interface",
			Arc::new(|_, _| {
				Err(yangstore_type::Error::with_items(
					ErrorCode::OperationFailed,
					"device busy",
					vec![yangstore_type::ErrorItem::new(
						"/ietf-interfaces:reset-interface",
						"interface is resetting already",
					)],
				))
			}),
		)
		.unwrap();

	let err = engine.send_rpc("/ietf-interfaces:reset-interface", rpc_input("eth0")).unwrap_err();
	assert_eq!(err.code, ErrorCode::CallbackFailed);
	assert!(err.message.contains("device busy"));
	assert_eq!(err.items.len(), 1);
}

#[test]
fn test_action_dispatch_with_keyed_path() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(plugin_module(), memory_bindings())).unwrap();

	let seen = Arc::new(Mutex::new(String::new()));
	let log = seen.clone();
	engine
		.subscribe_rpc(
			"/plugin:simple-cont/simple-cont2/ac1/acl1/acd1",
			Arc::new(move |path, _| {
				*log.lock().unwrap() = path.to_string();
				Ok(DataTree::new("plugin"))
			}),
		)
		.unwrap();

	engine
		.send_rpc("/plugin:simple-cont/simple-cont2/ac1/acl1[acs1='a']/acd1", DataTree::new("plugin"))
		.unwrap();
	assert_eq!(*seen.lock().unwrap(), "/plugin:simple-cont/simple-cont2/ac1/acl1[acs1='a']/acd1");
}

#[test]
fn test_notification_dispatch() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();

	let seen = Arc::new(Mutex::new(Vec::new()));
	let log = seen.clone();
	engine
		.subscribe_notification(
			"ietf-interfaces",
			None,
			None,
			Arc::new(move |event| {
				log.lock().unwrap().push((event.kind, event.tree.clone()));
			}),
		)
		.unwrap();

	engine.send_notification(notification("eth0", false)).unwrap();

	let events = seen.lock().unwrap();
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].0, NotificationKind::Realtime);
	assert_eq!(events[0].1.roots[0].name, "link-state-change");
}

#[test]
fn test_notification_must_match_schema() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();

	let mut bad = DataTree::new("ietf-interfaces");
	bad.roots.push(DataNode::container("ietf-interfaces", "no-such-notification"));
	assert_eq!(engine.send_notification(bad).unwrap_err().code, ErrorCode::Schema);

	let mut wrong_body = DataTree::new("ietf-interfaces");
	wrong_body.roots.push(
		DataNode::container("ietf-interfaces", "link-state-change")
			.with_child(DataNode::leaf("ietf-interfaces", "if-name", Value::Uint32(3))),
	);
	assert_eq!(engine.send_notification(wrong_body).unwrap_err().code, ErrorCode::ValidationFailed);
}

#[test]
fn test_notification_replay_window() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();
	engine.set_module_replay_support(Some("ietf-interfaces"), true).unwrap();

	let start = Timestamp::now();
	engine.send_notification(notification("eth0", false)).unwrap();
	engine.send_notification(notification("eth0", true)).unwrap();

	// a late subscriber with a replay window sees both, then the marker
	let seen = Arc::new(Mutex::new(Vec::new()));
	let log = seen.clone();
	engine
		.subscribe_notification(
			"ietf-interfaces",
			None,
			Some(start),
			Arc::new(move |event| {
				log.lock().unwrap().push(event.kind);
			}),
		)
		.unwrap();

	// live delivery continues after replay
	engine.send_notification(notification("eth1", true)).unwrap();

	let events = seen.lock().unwrap();
	assert_eq!(*events, vec![
		NotificationKind::Replay,
		NotificationKind::Replay,
		NotificationKind::ReplayComplete,
		NotificationKind::Realtime,
	]);
}

#[test]
fn test_replay_requires_replay_support() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();
	let err = engine
		.subscribe_notification("ietf-interfaces", None, Some(Timestamp(1)), Arc::new(|_| {}))
		.unwrap_err();
	assert_eq!(err.code, ErrorCode::Unsupported);
}

#[test]
fn test_change_subscription_through_session_commit() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(interfaces_module(), memory_bindings())).unwrap();

	let seen = Arc::new(Mutex::new(Vec::new()));
	let log = seen.clone();
	engine
		.subscribe_module_change(
			"ietf-interfaces",
			Datastore::Running,
			None,
			0,
			yangstore_subscription::EventMask::all(),
			Arc::new(move |event| {
				log.lock().unwrap().push((event.kind, event.changes.len()));
				Ok(())
			}),
		)
		.unwrap();

	let mut session = engine.session_start(Identity::root(), Datastore::Running);
	session
		.set_item(
			"/ietf-interfaces:interfaces/interface[name='eth0']/type",
			Some(Value::Text("eth".into())),
		)
		.unwrap();
	session.apply_changes().unwrap();

	let events = seen.lock().unwrap();
	assert_eq!(events.len(), 2, "change followed by done");
	assert_eq!(events[0].0, yangstore_subscription::EventKind::Change);
	assert_eq!(events[1].0, yangstore_subscription::EventKind::Done);
	// entry + name + type + defaulted enabled leaf
	assert!(events[0].1 >= 3);
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The same slot semantics are exercised against every built-in backend.

use yangstore_core::{
	interface::{Datastore, DsAccess, Identity, NotificationPlugin, StoragePlugin, Timestamp},
	path::DataPath,
	tree::{DataNode, DataTree},
};
use yangstore_storage::{JsonFilePlugin, JsonlNotificationPlugin, MemoryNotificationPlugin, MemoryPlugin};
use yangstore_testing::tempdir::temp_dir;
use yangstore_type::Value;

fn sample_tree() -> DataTree {
	let mut tree = DataTree::new("net");
	tree.roots.push(
		DataNode::container("net", "ifaces")
			.with_child(
				DataNode::container("net", "iface")
					.with_child(DataNode::leaf("net", "name", Value::Text("eth0".into())))
					.with_child(DataNode::leaf("net", "mtu", Value::Uint16(1500))),
			)
			.with_child(
				DataNode::container("net", "iface")
					.with_child(DataNode::leaf("net", "name", Value::Text("eth1".into())))
					.with_child(DataNode::leaf("net", "mtu", Value::Uint16(9000))),
			),
	);
	tree
}

fn exercise_storage(plugin: &dyn StoragePlugin) {
	plugin.init("net", Datastore::Running, None).unwrap();
	assert!(plugin.load("net", Datastore::Running, None).unwrap().is_empty());

	let tree = sample_tree();
	plugin.store("net", Datastore::Running, &tree).unwrap();
	assert_eq!(plugin.load("net", Datastore::Running, None).unwrap(), tree);

	// filtered load narrows to the selected subtree
	let path = DataPath::parse("/net:ifaces/iface[name='eth1']/mtu").unwrap();
	let filtered = plugin.load("net", Datastore::Running, Some(std::slice::from_ref(&path))).unwrap();
	assert_eq!(filtered.find(&path).unwrap().value, Some(Value::Uint16(9000)));
	assert!(filtered.find(&DataPath::parse("/net:ifaces/iface[name='eth0']").unwrap()).is_none());

	// candidate mirrors running, diverges on store, reverts on reset
	assert_eq!(plugin.load("net", Datastore::Candidate, None).unwrap(), tree);
	let mut edited = tree.clone();
	edited.delete(&DataPath::parse("/net:ifaces/iface[name='eth0']").unwrap());
	plugin.store("net", Datastore::Candidate, &edited).unwrap();
	assert_eq!(plugin.load("net", Datastore::Candidate, None).unwrap(), edited);
	assert_eq!(plugin.load("net", Datastore::Running, None).unwrap(), tree);
	plugin.candidate_reset("net").unwrap();
	assert_eq!(plugin.load("net", Datastore::Candidate, None).unwrap(), tree);

	// copy replicates the source slot
	plugin.copy("net", Datastore::Running, Datastore::Startup).unwrap();
	assert_eq!(plugin.load("net", Datastore::Startup, None).unwrap(), tree);

	// access modes round-trip and gate non-owners
	let access = DsAccess {
		owner: "alice".into(),
		group: "netconf".into(),
		perm: 0o640,
	};
	plugin.set_access("net", Datastore::Running, &access).unwrap();
	assert_eq!(plugin.get_access("net", Datastore::Running).unwrap(), access);
	assert!(plugin.check_access("net", Datastore::Running, &Identity::new("alice"), true).unwrap());
	assert!(!plugin.check_access("net", Datastore::Running, &Identity::new("eve"), false).unwrap());

	plugin.destroy("net", Datastore::Running).unwrap();
	assert!(plugin.load("net", Datastore::Running, None).unwrap().is_empty());
}

fn exercise_notifications(plugin: &dyn NotificationPlugin) {
	assert_eq!(plugin.earliest("net").unwrap(), None);
	for ts in [100u64, 200, 300] {
		let mut tree = DataTree::new("net");
		tree.roots.push(DataNode::leaf("net", "seq", Value::Uint64(ts)));
		plugin.append("net", &tree, Timestamp(ts)).unwrap();
	}
	assert_eq!(plugin.earliest("net").unwrap(), Some(Timestamp(100)));

	let window = plugin.replay("net", Timestamp(150), Timestamp(300)).unwrap();
	assert_eq!(window.len(), 2);
	assert_eq!(window[0].timestamp, Timestamp(200));
	assert_eq!(window[1].timestamp, Timestamp(300));

	plugin.destroy("net").unwrap();
	assert_eq!(plugin.earliest("net").unwrap(), None);
}

#[test]
fn test_memory_storage() {
	exercise_storage(&MemoryPlugin::new());
}

#[test]
fn test_json_file_storage() {
	temp_dir(|root| exercise_storage(&JsonFilePlugin::new(root).unwrap()));
}

#[test]
fn test_memory_notifications() {
	exercise_notifications(&MemoryNotificationPlugin::new());
}

#[test]
fn test_jsonl_notifications() {
	temp_dir(|root| exercise_notifications(&JsonlNotificationPlugin::new(root).unwrap()));
}

#[test]
fn test_json_file_survives_reopen() {
	temp_dir(|root| {
		let tree = sample_tree();
		{
			let plugin = JsonFilePlugin::new(root).unwrap();
			plugin.store("net", Datastore::Running, &tree).unwrap();
		}
		let reopened = JsonFilePlugin::new(root).unwrap();
		assert_eq!(reopened.load("net", Datastore::Running, None).unwrap(), tree);
		assert!(reopened.last_modified("net", Datastore::Running).unwrap().is_some());
	});
}

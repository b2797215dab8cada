// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The operational composer: pull providers, push edits, origins and
//! overlay discards.

use std::sync::Arc;

use yangstore_core::{
	interface::{Datastore, Identity},
	tree::{DataNode, DataTree},
};
use yangstore_engine::test_utils::{create_test_engine, memory_bindings};
use yangstore_registry::InstallRequest;
use yangstore_testing::modules::{solo_module, state_module};
use yangstore_type::{Origin, Value};

fn bus_tree(leaf: &str, value: Value) -> DataTree {
	let mut tree = DataTree::new("state-module");
	tree.roots.push(
		DataNode::container("state-module", "bus").with_child(DataNode::leaf("state-module", leaf, value)),
	);
	tree
}

#[test]
fn test_single_provider_single_value() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(state_module(), memory_bindings())).unwrap();

	engine
		.subscribe_oper_get(
			"/state-module:bus/gps_located",
			Arc::new(|_| Ok(bus_tree("gps_located", Value::Bool(false)))),
		)
		.unwrap();

	let session = engine.session_start(Identity::root(), Datastore::Operational);
	let items = session.get_items("/state-module:bus/*").unwrap();
	assert_eq!(items.len(), 1);
	assert_eq!(items[0].value, Some(Value::Bool(false)));
	assert_eq!(items[0].path.to_string(), "/state-module:bus/gps_located");
}

#[test]
fn test_two_providers_both_values() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(state_module(), memory_bindings())).unwrap();

	engine
		.subscribe_oper_get(
			"/state-module:bus/gps_located",
			Arc::new(|_| Ok(bus_tree("gps_located", Value::Bool(true)))),
		)
		.unwrap();
	engine
		.subscribe_oper_get(
			"/state-module:bus/distance_travelled",
			Arc::new(|_| Ok(bus_tree("distance_travelled", Value::Uint32(999)))),
		)
		.unwrap();

	let session = engine.session_start(Identity::root(), Datastore::Operational);
	let mut values: Vec<String> = session
		.get_items("/state-module:bus/*")
		.unwrap()
		.into_iter()
		.map(|i| i.value.unwrap().to_string())
		.collect();
	values.sort();
	assert_eq!(values, vec!["999".to_string(), "true".to_string()]);
}

#[test]
fn test_missing_provider_yields_empty_not_error() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(state_module(), memory_bindings())).unwrap();

	let session = engine.session_start(Identity::root(), Datastore::Operational);
	assert!(session.get_items("/state-module:bus/*").unwrap().is_empty());
}

#[test]
fn test_provider_values_carry_dynamic_origin() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(state_module(), memory_bindings())).unwrap();
	engine
		.subscribe_oper_get(
			"/state-module:bus/gps_located",
			Arc::new(|_| Ok(bus_tree("gps_located", Value::Bool(true)))),
		)
		.unwrap();

	let session = engine.session_start(Identity::root(), Datastore::Operational);
	let item = session.get_item("/state-module:bus/gps_located").unwrap();
	assert_eq!(item.origin, Some(Origin::Dynamic));
}

#[test]
fn test_push_edits_override_providers() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(state_module(), memory_bindings())).unwrap();
	engine
		.subscribe_oper_get(
			"/state-module:bus/distance_travelled",
			Arc::new(|_| Ok(bus_tree("distance_travelled", Value::Uint32(1)))),
		)
		.unwrap();

	// a push edit through an operational session
	let mut pusher = engine.session_start(Identity::root(), Datastore::Operational);
	pusher
		.set_item("/state-module:bus/distance_travelled", Some(Value::Uint32(777)))
		.unwrap();
	pusher.apply_changes().unwrap();

	let session = engine.session_start(Identity::root(), Datastore::Operational);
	let item = session.get_item("/state-module:bus/distance_travelled").unwrap();
	assert_eq!(item.value, Some(Value::Uint32(777)));
	assert_eq!(item.origin, Some(Origin::Intended));
}

#[test]
fn test_discard_items_removes_overlay_only() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(state_module(), memory_bindings())).unwrap();
	engine
		.subscribe_oper_get(
			"/state-module:bus/distance_travelled",
			Arc::new(|_| Ok(bus_tree("distance_travelled", Value::Uint32(1)))),
		)
		.unwrap();

	let mut session = engine.session_start(Identity::root(), Datastore::Operational);
	session.set_item("/state-module:bus/distance_travelled", Some(Value::Uint32(777))).unwrap();
	session.apply_changes().unwrap();
	assert_eq!(
		session.get_item("/state-module:bus/distance_travelled").unwrap().value,
		Some(Value::Uint32(777))
	);

	session.discard_items("/state-module:bus/distance_travelled").unwrap();

	// the provider value shines through again
	let item = session.get_item("/state-module:bus/distance_travelled").unwrap();
	assert_eq!(item.value, Some(Value::Uint32(1)));
	assert_eq!(item.origin, Some(Origin::Dynamic));
}

#[test]
fn test_slow_provider_contributes_empty_subtree() {
	let mut config = yangstore_engine::EngineConfig::default();
	config.provider_timeout = std::time::Duration::from_millis(50);
	let engine = yangstore_engine::test_utils::create_test_engine_with_config(config);
	engine.install_module(InstallRequest::new(state_module(), memory_bindings())).unwrap();

	engine
		.subscribe_oper_get(
			"/state-module:bus/gps_located",
			Arc::new(|_| {
				std::thread::sleep(std::time::Duration::from_secs(30));
				Ok(bus_tree("gps_located", Value::Bool(true)))
			}),
		)
		.unwrap();
	engine
		.subscribe_oper_get(
			"/state-module:bus/distance_travelled",
			Arc::new(|_| Ok(bus_tree("distance_travelled", Value::Uint32(5)))),
		)
		.unwrap();

	let session = engine.session_start(Identity::root(), Datastore::Operational);
	let items = session.get_items("/state-module:bus/*").unwrap();
	// the healthy provider answered, the stuck one yielded nothing
	assert_eq!(items.len(), 1);
	assert_eq!(items[0].value, Some(Value::Uint32(5)));
}

#[test]
fn test_config_module_without_providers_or_pushes_reads_empty() {
	let engine = create_test_engine();
	engine.install_module(InstallRequest::new(solo_module(), memory_bindings())).unwrap();

	let session = engine.session_start(Identity::root(), Datastore::Operational);
	assert!(session.get_items("/solo:box/*").unwrap().is_empty());
}

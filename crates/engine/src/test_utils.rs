// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Engine builders for tests and examples.

use std::sync::Arc;

use yangstore_core::interface::{NotificationPlugin, StoragePlugin};
use yangstore_registry::{DsBindings, PluginSet};
use yangstore_storage::{MemoryNotificationPlugin, MemoryPlugin};

use crate::{Engine, EngineConfig};

/// Memory-backed bindings used by the test engines.
pub fn memory_bindings() -> DsBindings {
	DsBindings::uniform("memory").with_notification("memory-notif")
}

/// An engine over fresh in-memory plugins.
pub fn create_test_engine() -> Engine {
	create_test_engine_with_config(EngineConfig::default())
}

pub fn create_test_engine_with_config(config: EngineConfig) -> Engine {
	let plugins = PluginSet::new()
		.with_storage(Arc::new(MemoryPlugin::new()) as Arc<dyn StoragePlugin>)
		.with_notification(Arc::new(MemoryNotificationPlugin::new()) as Arc<dyn NotificationPlugin>);
	Engine::new(plugins, memory_bindings(), config).expect("test engine bootstrap")
}

/// A test engine that also exposes its memory storage plugin for direct
/// inspection.
pub fn create_test_engine_with_storage() -> (Engine, Arc<MemoryPlugin>) {
	let storage = Arc::new(MemoryPlugin::new());
	let plugins = PluginSet::new()
		.with_storage(storage.clone() as Arc<dyn StoragePlugin>)
		.with_notification(Arc::new(MemoryNotificationPlugin::new()) as Arc<dyn NotificationPlugin>);
	let engine = Engine::new(plugins, memory_bindings(), EngineConfig::default()).expect("test engine bootstrap");
	(engine, storage)
}

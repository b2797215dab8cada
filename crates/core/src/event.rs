// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Engine-internal lifecycle events.
//!
//! Distinct from change subscriptions: these carry no data trees and exist so
//! engine components (and tests) can observe lifecycle transitions without
//! polling the registry.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::interface::SessionId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
	/// A new schema context became current.
	SchemaSwapped {
		content_id: u64,
	},
	ModuleInstalled {
		module: String,
	},
	ModuleRemoved {
		module: String,
	},
	SessionStarted {
		session: SessionId,
	},
	SessionStopped {
		session: SessionId,
	},
}

type Listener = Box<dyn Fn(&EngineEvent) + Send + Sync>;

/// A cheap-to-clone fan-out bus for [`EngineEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
	listeners: Arc<RwLock<Vec<Listener>>>,
}

impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on(&self, listener: impl Fn(&EngineEvent) + Send + Sync + 'static) {
		self.listeners.write().push(Box::new(listener));
	}

	pub fn emit(&self, event: EngineEvent) {
		for listener in self.listeners.read().iter() {
			listener(&event);
		}
	}
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus").field("listeners", &self.listeners.read().len()).finish()
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Contracts between the engine and its external collaborators: storage
//! plugins, notification plugins and the access-control hook.

pub use auth::Identity;
pub use plugin::{DsAccess, NotificationPlugin, StoragePlugin, StoredNotification};

mod auth;
mod plugin;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// The addressable datastores of one module.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Datastore {
	Startup,
	Running,
	Candidate,
	Operational,
	FactoryDefault,
}

impl Datastore {
	pub const ALL: [Datastore; 5] =
		[Datastore::Startup, Datastore::Running, Datastore::Candidate, Datastore::Operational, Datastore::FactoryDefault];

	/// Datastores holding configuration (editable through sessions).
	pub fn is_conventional(&self) -> bool {
		!matches!(self, Datastore::Operational)
	}
}

impl Display for Datastore {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Datastore::Startup => f.write_str("startup"),
			Datastore::Running => f.write_str("running"),
			Datastore::Candidate => f.write_str("candidate"),
			Datastore::Operational => f.write_str("operational"),
			Datastore::FactoryDefault => f.write_str("factory-default"),
		}
	}
}

/// Identifier of one client session, unique for the engine's lifetime.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl Display for SessionId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.0, f)
	}
}

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
	pub fn now() -> Self {
		let millis = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as u64)
			.unwrap_or_default();
		Self(millis)
	}

	pub fn is_zero(&self) -> bool {
		self.0 == 0
	}
}

impl Display for Timestamp {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.0, f)
	}
}

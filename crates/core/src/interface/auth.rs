// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};

/// The identity a session acts under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub user: String,
	pub groups: Vec<String>,
}

impl Identity {
	pub fn new(user: impl Into<String>) -> Self {
		Self {
			user: user.into(),
			groups: Vec::new(),
		}
	}

	pub fn with_groups(user: impl Into<String>, groups: Vec<String>) -> Self {
		Self {
			user: user.into(),
			groups,
		}
	}

	/// The superuser identity, exempt from datastore access checks.
	pub fn root() -> Self {
		Self {
			user: "root".to_string(),
			groups: vec!["root".to_string()],
		}
	}

	pub fn is_root(&self) -> bool {
		self.user == "root"
	}
}

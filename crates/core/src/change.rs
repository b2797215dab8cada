// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use yangstore_type::Value;

use crate::path::DataPath;

/// Target position for moving an entry of a user-ordered list or leaf-list.
///
/// `Before`/`After` carry the anchor as a rendered key predicate
/// (`[k='v']...`) for lists, or the entry value for leaf-lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovePosition {
	First,
	Last,
	Before(String),
	After(String),
}

/// What happened to one node, as seen by change subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
	Created,
	Modified,
	Deleted,
	Moved,
}

impl Display for ChangeKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ChangeKind::Created => f.write_str("created"),
			ChangeKind::Modified => f.write_str("modified"),
			ChangeKind::Deleted => f.write_str("deleted"),
			ChangeKind::Moved => f.write_str("moved"),
		}
	}
}

/// One entry of the ordered change list produced by a commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
	pub kind: ChangeKind,
	pub path: DataPath,
	/// Previous value for `Modified`/`Deleted` leaves.
	pub old_value: Option<Value>,
	/// New value for `Created`/`Modified` leaves.
	pub new_value: Option<Value>,
}

impl Change {
	pub fn created(path: DataPath, new_value: Option<Value>) -> Self {
		Self {
			kind: ChangeKind::Created,
			path,
			old_value: None,
			new_value,
		}
	}

	pub fn modified(path: DataPath, old_value: Option<Value>, new_value: Option<Value>) -> Self {
		Self {
			kind: ChangeKind::Modified,
			path,
			old_value,
			new_value,
		}
	}

	pub fn deleted(path: DataPath, old_value: Option<Value>) -> Self {
		Self {
			kind: ChangeKind::Deleted,
			path,
			old_value,
			new_value: None,
		}
	}

	pub fn moved(path: DataPath) -> Self {
		Self {
			kind: ChangeKind::Moved,
			path,
			old_value: None,
			new_value: None,
		}
	}
}

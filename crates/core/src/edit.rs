// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};
use yangstore_type::Value;

use crate::{change::MovePosition, path::DataPath, tree::DataTree};

/// Options modifying a single edit operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOptions {
	/// Fail with DATA_EXISTS / DATA_MISSING instead of merging silently.
	pub strict: bool,
	/// Require every ancestor of the target path to exist already.
	pub non_recursive: bool,
	/// A set of a default-equal value may replace a default-originated one.
	pub default_may_replace_default: bool,
	/// Keep this operation out of batch coalescing with neighbours.
	pub isolate: bool,
}

impl EditOptions {
	pub fn strict() -> Self {
		Self {
			strict: true,
			..Self::default()
		}
	}
}

/// Default operation applied to nodes of an `edit_batch` tree that carry no
/// explicit per-node operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultOp {
	#[default]
	Merge,
	Replace,
	Remove,
}

/// One buffered session operation, applied in submission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EditOp {
	Set {
		path: DataPath,
		value: Option<Value>,
		options: EditOptions,
	},
	Delete {
		path: DataPath,
		options: EditOptions,
	},
	Move {
		path: DataPath,
		position: MovePosition,
		options: EditOptions,
	},
	EditBatch {
		tree: DataTree,
		default_op: DefaultOp,
	},
	ReplaceConfig {
		tree: DataTree,
	},
}

impl EditOp {
	/// The module this operation touches.
	pub fn module(&self) -> &str {
		match self {
			EditOp::Set {
				path, ..
			}
			| EditOp::Delete {
				path, ..
			}
			| EditOp::Move {
				path, ..
			} => path.module(),
			EditOp::EditBatch {
				tree, ..
			}
			| EditOp::ReplaceConfig {
				tree,
			} => &tree.module,
		}
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use commit::{CommitOutcome, CommitSettings, ModuleCommit, apply_changes};
pub use diff::diff_module;
pub use lock::{LockManager, LockMode};
pub use ops::{BufferedOp, apply_op, concrete_path, replay_ops};
pub use validate::{DataAccess, materialize_defaults, validate_module};

pub mod commit;
pub mod diff;
pub mod lock;
pub mod ops;
pub mod validate;

pub type Result<T> = std::result::Result<T, yangstore_type::Error>;

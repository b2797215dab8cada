// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use change::{Change, ChangeKind, MovePosition};
pub use edit::{DefaultOp, EditOp, EditOptions};
pub use event::{EngineEvent, EventBus};
pub use path::{DataPath, PathSegment};
pub use tree::{DataNode, DataTree};

pub mod change;
pub mod edit;
pub mod event;
pub mod interface;
pub mod path;
pub mod tree;

pub type Result<T> = std::result::Result<T, yangstore_type::Error>;

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use context::{ModuleSchema, SchemaContext};
pub use module::ModuleDef;
pub use node::{NodeKind, SchemaNode, TypeSpec};
pub use walk::{Flow, walk};

pub mod context;
pub mod module;
pub mod node;
pub mod validate;
pub mod walk;
pub mod xpath;

pub type Result<T> = std::result::Result<T, yangstore_type::Error>;

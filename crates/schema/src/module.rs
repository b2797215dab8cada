// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};

use crate::node::SchemaNode;

/// Parser output for one YANG module.
///
/// This is the boundary to the external YANG text parser: whatever produces a
/// `ModuleDef` (a real parser, a test fixture, the built-in self module) feeds
/// the same compile path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
	pub name: String,
	pub revision: Option<String>,
	/// Modules this module imports; all must be present in the context.
	pub imports: Vec<String>,
	/// Implemented modules this module includes (submodules promoted to
	/// modules by the parser); resolved like imports.
	pub includes: Vec<String>,
	/// Feature names the module declares.
	pub features: Vec<String>,
	/// Top-level nodes: data, rpcs and notifications together.
	pub nodes: Vec<SchemaNode>,
}

impl ModuleDef {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			revision: None,
			imports: Vec::new(),
			includes: Vec::new(),
			features: Vec::new(),
			nodes: Vec::new(),
		}
	}

	pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
		self.revision = Some(revision.into());
		self
	}

	pub fn with_import(mut self, module: impl Into<String>) -> Self {
		self.imports.push(module.into());
		self
	}

	pub fn with_include(mut self, module: impl Into<String>) -> Self {
		self.includes.push(module.into());
		self
	}

	pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
		self.features.push(feature.into());
		self
	}

	pub fn with_node(mut self, node: SchemaNode) -> Self {
		self.nodes.push(node);
		self
	}
}

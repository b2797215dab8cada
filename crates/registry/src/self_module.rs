// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The built-in self module.
//!
//! The registry document is itself YANG-modelled data: it validates against
//! this module's schema and persists through this module's startup plugin.
//! The self module is installed at engine bootstrap and is not removable.

use once_cell::sync::Lazy;
use yangstore_schema::{ModuleDef, SchemaNode, TypeSpec};

pub const SELF_MODULE_NAME: &str = "yangstore";

static SELF_MODULE: Lazy<ModuleDef> = Lazy::new(build);

/// The parser-level definition of the self module.
pub fn self_module_def() -> ModuleDef {
	SELF_MODULE.clone()
}

fn build() -> ModuleDef {
	let dep = SchemaNode::keyless_list("dep")
		.with_child(SchemaNode::leaf(
			"kind",
			TypeSpec::Enumeration {
				names: vec!["leafref".into(), "inst-id".into(), "xpath".into()],
			},
		))
		.with_child(SchemaNode::leaf_list("target-module", TypeSpec::Text))
		.with_child(SchemaNode::leaf("target-path", TypeSpec::Text))
		.with_child(SchemaNode::leaf("source-path", TypeSpec::Text))
		.with_child(SchemaNode::leaf("default-target-path", TypeSpec::Text))
		.with_child(SchemaNode::leaf("expression", TypeSpec::Text));

	let module_list = SchemaNode::list("module", vec!["name"])
		.with_child(SchemaNode::leaf("name", TypeSpec::Text))
		.with_child(SchemaNode::leaf("revision", TypeSpec::Text))
		.with_child(SchemaNode::leaf_list("enabled-feature", TypeSpec::Text))
		.with_child(
			SchemaNode::container("plugins")
				.with_child(SchemaNode::leaf("startup", TypeSpec::Text))
				.with_child(SchemaNode::leaf("running", TypeSpec::Text))
				.with_child(SchemaNode::leaf("candidate", TypeSpec::Text))
				.with_child(SchemaNode::leaf("operational", TypeSpec::Text))
				.with_child(SchemaNode::leaf("factory-default", TypeSpec::Text))
				.with_child(SchemaNode::leaf("notification", TypeSpec::Text)),
		)
		.with_child(
			SchemaNode::presence_container("replay-support")
				.with_child(SchemaNode::leaf("earliest", TypeSpec::Uint64)),
		)
		.with_child(SchemaNode::leaf("owner", TypeSpec::Text))
		.with_child(SchemaNode::leaf("group", TypeSpec::Text))
		.with_child(SchemaNode::leaf("perm", TypeSpec::Uint32))
		.with_child(dep.clone())
		.with_child(
			SchemaNode::keyless_list("op-dep")
				.with_child(SchemaNode::leaf("path", TypeSpec::Text))
				.with_child(dep),
		)
		.with_child(SchemaNode::leaf_list("inverse-dep", TypeSpec::Text));

	ModuleDef::new(SELF_MODULE_NAME)
		.with_revision("2025-03-11")
		.with_node(SchemaNode::leaf("content-id", TypeSpec::Uint64))
		.with_node(SchemaNode::container("modules").with_child(module_list))
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The persistent module registry document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use yangstore_core::{
	interface::Timestamp,
	tree::{DataNode, DataTree},
};
use yangstore_type::Value;

/// Per-datastore storage plugin names of one module, plus the optional
/// notification plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsBindings {
	pub startup: String,
	pub running: String,
	pub candidate: String,
	pub operational: String,
	pub factory_default: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notification: Option<String>,
}

impl DsBindings {
	pub fn uniform(plugin: impl Into<String>) -> Self {
		let plugin = plugin.into();
		Self {
			startup: plugin.clone(),
			running: plugin.clone(),
			candidate: plugin.clone(),
			operational: plugin.clone(),
			factory_default: plugin,
			notification: None,
		}
	}

	pub fn with_notification(mut self, plugin: impl Into<String>) -> Self {
		self.notification = Some(plugin.into());
		self
	}

	pub fn for_datastore(&self, ds: yangstore_core::interface::Datastore) -> &str {
		use yangstore_core::interface::Datastore::*;
		match ds {
			Startup => &self.startup,
			Running => &self.running,
			Candidate => &self.candidate,
			Operational => &self.operational,
			FactoryDefault => &self.factory_default,
		}
	}
}

/// One cross-module reference recorded for a module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DepRecord {
	Leafref {
		target_module: String,
		/// Canonical JSON-qualified schema path of the target.
		target_path: String,
	},
	InstId {
		/// Schema path of the instance-identifier leaf itself.
		source_path: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		default_target_path: Option<String>,
	},
	Xpath {
		expression: String,
		/// Foreign modules the expression textually reaches.
		target_modules: Vec<String>,
	},
}

impl DepRecord {
	/// Modules this dependency points at.
	pub fn target_modules(&self) -> Vec<&str> {
		match self {
			DepRecord::Leafref {
				target_module, ..
			} => vec![target_module],
			DepRecord::InstId {
				..
			} => Vec::new(),
			DepRecord::Xpath {
				target_modules, ..
			} => target_modules.iter().map(|m| m.as_str()).collect(),
		}
	}
}

/// Dependencies scoped under one rpc, action or notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpDeps {
	/// Canonical schema path of the operation node.
	pub path: String,
	pub deps: Vec<DepRecord>,
}

/// Replay state of a module's notification stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySupport {
	pub earliest: Timestamp,
}

/// Everything the registry knows about one installed module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub revision: Option<String>,
	/// Enabled features in enable order.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub features: Vec<String>,
	pub plugins: DsBindings,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub replay: Option<ReplaySupport>,
	pub owner: String,
	pub group: String,
	pub perm: u32,
	/// Outbound data dependencies in schema traversal order.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub deps: Vec<DepRecord>,
	/// Per-operation dependency subsets.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub op_deps: Vec<OpDeps>,
	/// Modules whose dependency sets name this module.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub inverse_deps: Vec<String>,
}

impl ModuleRecord {
	/// Every module this record's data and operation deps reach.
	pub fn dependency_modules(&self) -> Vec<&str> {
		let mut out: Vec<&str> = Vec::new();
		let all = self.deps.iter().chain(self.op_deps.iter().flat_map(|op| op.deps.iter()));
		for dep in all {
			for module in dep.target_modules() {
				if module != self.name && !out.contains(&module) {
					out.push(module);
				}
			}
		}
		out
	}
}

/// The whole registry document: what gets validated against the self module
/// schema and persisted through the self module's startup plugin.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDoc {
	pub content_id: u64,
	pub modules: IndexMap<String, ModuleRecord>,
}

impl RegistryDoc {
	/// Rebuild every record's inverse-deps from the forward sets. Both
	/// directions always change together.
	pub fn rebuild_inverse_deps(&mut self) {
		let forward: Vec<(String, Vec<String>)> = self
			.modules
			.values()
			.map(|r| (r.name.clone(), r.dependency_modules().into_iter().map(String::from).collect()))
			.collect();
		for record in self.modules.values_mut() {
			record.inverse_deps.clear();
		}
		for (source, targets) in forward {
			for target in targets {
				if let Some(record) = self.modules.get_mut(&target) {
					if !record.inverse_deps.contains(&source) {
						record.inverse_deps.push(source.clone());
					}
				}
			}
		}
	}

	/// Render the document as the self module's data tree.
	pub fn to_tree(&self, self_module: &str) -> DataTree {
		let mut tree = DataTree::new(self_module);
		tree.roots.push(DataNode::leaf(self_module, "content-id", Value::Uint64(self.content_id)));
		let mut modules = DataNode::container(self_module, "modules");
		for record in self.modules.values() {
			modules.children.push(record_to_node(self_module, record));
		}
		tree.roots.push(modules);
		tree
	}
}

fn record_to_node(module: &str, record: &ModuleRecord) -> DataNode {
	let mut node = DataNode::container(module, "module")
		.with_child(DataNode::leaf(module, "name", Value::Text(record.name.clone())));
	if let Some(revision) = &record.revision {
		node.children.push(DataNode::leaf(module, "revision", Value::Text(revision.clone())));
	}
	for feature in &record.features {
		node.children.push(DataNode::leaf(module, "enabled-feature", Value::Text(feature.clone())));
	}
	let plugins = DataNode::container(module, "plugins")
		.with_child(DataNode::leaf(module, "startup", Value::Text(record.plugins.startup.clone())))
		.with_child(DataNode::leaf(module, "running", Value::Text(record.plugins.running.clone())))
		.with_child(DataNode::leaf(module, "candidate", Value::Text(record.plugins.candidate.clone())))
		.with_child(DataNode::leaf(module, "operational", Value::Text(record.plugins.operational.clone())))
		.with_child(DataNode::leaf(
			module,
			"factory-default",
			Value::Text(record.plugins.factory_default.clone()),
		));
	let plugins = match &record.plugins.notification {
		Some(notification) => {
			plugins.with_child(DataNode::leaf(module, "notification", Value::Text(notification.clone())))
		}
		None => plugins,
	};
	node.children.push(plugins);
	if let Some(replay) = &record.replay {
		node.children.push(DataNode::container(module, "replay-support").with_child(DataNode::leaf(
			module,
			"earliest",
			Value::Uint64(replay.earliest.0),
		)));
	}
	node.children.push(DataNode::leaf(module, "owner", Value::Text(record.owner.clone())));
	node.children.push(DataNode::leaf(module, "group", Value::Text(record.group.clone())));
	node.children.push(DataNode::leaf(module, "perm", Value::Uint32(record.perm)));
	for dep in &record.deps {
		node.children.push(dep_to_node(module, dep));
	}
	for op in &record.op_deps {
		let mut op_node = DataNode::container(module, "op-dep")
			.with_child(DataNode::leaf(module, "path", Value::Text(op.path.clone())));
		for dep in &op.deps {
			op_node.children.push(dep_to_node(module, dep));
		}
		node.children.push(op_node);
	}
	for inverse in &record.inverse_deps {
		node.children.push(DataNode::leaf(module, "inverse-dep", Value::Text(inverse.clone())));
	}
	node
}

fn dep_to_node(module: &str, dep: &DepRecord) -> DataNode {
	let node = DataNode::container(module, "dep");
	match dep {
		DepRecord::Leafref {
			target_module,
			target_path,
		} => node
			.with_child(DataNode::leaf(module, "kind", Value::Enum("leafref".into())))
			.with_child(DataNode::leaf(module, "target-module", Value::Text(target_module.clone())))
			.with_child(DataNode::leaf(module, "target-path", Value::Text(target_path.clone()))),
		DepRecord::InstId {
			source_path,
			default_target_path,
		} => {
			let node = node
				.with_child(DataNode::leaf(module, "kind", Value::Enum("inst-id".into())))
				.with_child(DataNode::leaf(module, "source-path", Value::Text(source_path.clone())));
			match default_target_path {
				Some(default) => node.with_child(DataNode::leaf(
					module,
					"default-target-path",
					Value::Text(default.clone()),
				)),
				None => node,
			}
		}
		DepRecord::Xpath {
			expression,
			target_modules,
		} => {
			let mut node = node
				.with_child(DataNode::leaf(module, "kind", Value::Enum("xpath".into())))
				.with_child(DataNode::leaf(module, "expression", Value::Text(expression.clone())));
			for target in target_modules {
				node.children.push(DataNode::leaf(module, "target-module", Value::Text(target.clone())));
			}
			node
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn record(name: &str, deps: Vec<DepRecord>) -> ModuleRecord {
		ModuleRecord {
			name: name.to_string(),
			revision: None,
			features: Vec::new(),
			plugins: DsBindings::uniform("memory"),
			replay: None,
			owner: "root".into(),
			group: "root".into(),
			perm: 0o600,
			deps,
			op_deps: Vec::new(),
			inverse_deps: Vec::new(),
		}
	}

	#[test]
	fn test_inverse_deps_symmetry() {
		let mut doc = RegistryDoc::default();
		doc.modules.insert("a".into(), record("a", vec![DepRecord::Leafref {
			target_module: "b".into(),
			target_path: "/b:x".into(),
		}]));
		doc.modules.insert("b".into(), record("b", Vec::new()));
		doc.rebuild_inverse_deps();

		assert_eq!(doc.modules["b"].inverse_deps, vec!["a".to_string()]);
		assert!(doc.modules["a"].inverse_deps.is_empty());

		// removing the dependency clears both directions on rebuild
		doc.modules.get_mut("a").unwrap().deps.clear();
		doc.rebuild_inverse_deps();
		assert!(doc.modules["b"].inverse_deps.is_empty());
	}

	#[test]
	fn test_self_reference_not_recorded() {
		let mut doc = RegistryDoc::default();
		doc.modules.insert("a".into(), record("a", vec![DepRecord::Leafref {
			target_module: "a".into(),
			target_path: "/a:x".into(),
		}]));
		doc.rebuild_inverse_deps();
		assert!(doc.modules["a"].inverse_deps.is_empty());
	}

	#[test]
	fn test_doc_round_trips_through_json() {
		let mut doc = RegistryDoc::default();
		doc.content_id = 7;
		doc.modules.insert("a".into(), record("a", vec![DepRecord::Xpath {
			expression: "/b:x = 'y'".into(),
			target_modules: vec!["b".into()],
		}]));
		let text = serde_json::to_string(&doc).unwrap();
		let parsed: RegistryDoc = serde_json::from_str(&text).unwrap();
		assert_eq!(parsed, doc);
	}
}

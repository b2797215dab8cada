// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Dependency analysis over a compiled schema context.
//!
//! One depth-first walk per module collects the three dependency kinds from
//! leaf types and when/must expressions. Operation subtrees (rpc, action,
//! notification) are skipped by the data walk and analysed separately with
//! the operation as the top ancestor, so their dependencies land in
//! per-operation subsets.

use yangstore_schema::{
	Flow, ModuleSchema, SchemaContext, SchemaNode, TypeSpec, context::leafref_target_module, walk,
	xpath::referenced_prefixes,
};

use crate::{
	Result,
	record::{DepRecord, OpDeps},
};

/// The analysis result for one module.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleDeps {
	pub data: Vec<DepRecord>,
	pub ops: Vec<OpDeps>,
	/// Every foreign module referenced anywhere, deduplicated by name.
	pub foreign_modules: Vec<String>,
}

/// Analyse one compiled module.
pub fn analyze(module: &ModuleSchema) -> Result<ModuleDeps> {
	let mut out = ModuleDeps::default();

	let mut operations: Vec<(String, &SchemaNode)> = Vec::new();
	walk(&module.data, &mut |node, trail| {
		if node.is_operation() {
			let mut names: Vec<&str> = trail.to_vec();
			names.push(&node.name);
			operations.push((SchemaContext::schema_path(&module.name, &names), node));
			return Ok(Flow::Skip);
		}
		collect_node_deps(&module.name, node, trail, &mut out.data);
		Ok(Flow::Continue)
	})?;

	for rpc in &module.rpcs {
		operations.push((SchemaContext::schema_path(&module.name, &[&rpc.name]), rpc));
	}
	for notification in &module.notifications {
		operations.push((SchemaContext::schema_path(&module.name, &[&notification.name]), notification));
	}

	for (path, op) in operations {
		let mut deps = Vec::new();
		collect_node_deps(&module.name, op, &[], &mut deps);
		walk(&op.children, &mut |node, trail| {
			collect_node_deps(&module.name, node, trail, &mut deps);
			Ok(Flow::Continue)
		})?;
		out.ops.push(OpDeps {
			path,
			deps,
		});
	}

	for dep in out.data.iter().chain(out.ops.iter().flat_map(|op| op.deps.iter())) {
		for target in dep.target_modules() {
			if target != module.name && !out.foreign_modules.iter().any(|m| m == target) {
				out.foreign_modules.push(target.to_string());
			}
		}
	}
	Ok(out)
}

/// Record the dependencies contributed by a single schema node.
fn collect_node_deps(module: &str, node: &SchemaNode, trail: &[&str], deps: &mut Vec<DepRecord>) {
	if let Some(spec) = &node.type_spec {
		let mut names: Vec<&str> = trail.to_vec();
		names.push(&node.name);
		collect_type_deps(module, spec, &SchemaContext::schema_path(module, &names), node, deps);
	}
	if let Some(when) = &node.when {
		push_xpath_dep(module, when, deps);
	}
	for must in &node.musts {
		push_xpath_dep(module, must, deps);
	}
}

fn collect_type_deps(module: &str, spec: &TypeSpec, source_path: &str, node: &SchemaNode, deps: &mut Vec<DepRecord>) {
	match spec {
		TypeSpec::Leafref {
			path, ..
		} => {
			// exactly one target module, the module of the first
			// qualified step; an unqualified path stays local
			let target_module = leafref_target_module(path).unwrap_or_else(|| module.to_string());
			push_dep(deps, DepRecord::Leafref {
				target_module,
				target_path: path.clone(),
			});
		}
		TypeSpec::InstanceIdentifier {
			require_instance,
		} => {
			if *require_instance {
				push_dep(deps, DepRecord::InstId {
					source_path: source_path.to_string(),
					default_target_path: node.default.clone(),
				});
			}
		}
		TypeSpec::Union {
			branches,
		} => {
			for branch in branches {
				collect_type_deps(module, branch, source_path, node, deps);
			}
		}
		_ => {}
	}
}

fn push_xpath_dep(module: &str, expression: &str, deps: &mut Vec<DepRecord>) {
	let target_modules: Vec<String> =
		referenced_prefixes(expression).into_iter().filter(|prefix| prefix != module).collect();
	push_dep(deps, DepRecord::Xpath {
		expression: expression.to_string(),
		target_modules,
	});
}

/// Append, suppressing duplicate (kind, target, path) triples.
fn push_dep(deps: &mut Vec<DepRecord>, dep: DepRecord) {
	if !deps.contains(&dep) {
		deps.push(dep);
	}
}

#[cfg(test)]
mod test {
	use indexmap::IndexMap;
	use yangstore_testing::modules::{interfaces_module, refs_module};

	use super::*;

	fn analyzed() -> ModuleDeps {
		let ctx = SchemaContext::compile(&[interfaces_module(), refs_module()], &IndexMap::new()).unwrap();
		analyze(ctx.module("refs").unwrap()).unwrap()
	}

	#[test]
	fn test_leafref_records_single_target() {
		let deps = analyzed();
		assert!(deps.data.iter().any(|d| matches!(
			d,
			DepRecord::Leafref { target_module, target_path }
				if target_module == "ietf-interfaces"
					&& target_path == "/ietf-interfaces:interfaces/interface/name"
		)));
	}

	#[test]
	fn test_when_and_must_become_xpath_deps() {
		let deps = analyzed();
		let xpaths: Vec<&DepRecord> =
			deps.data.iter().filter(|d| matches!(d, DepRecord::Xpath { .. })).collect();
		assert_eq!(xpaths.len(), 2);
		for dep in xpaths {
			let DepRecord::Xpath {
				target_modules, ..
			} = dep
			else {
				unreachable!()
			};
			assert_eq!(target_modules, &vec!["ietf-interfaces".to_string()]);
		}
	}

	#[test]
	fn test_inst_id_skipped_without_require_instance() {
		let deps = analyzed();
		let inst_ids: Vec<&DepRecord> =
			deps.data.iter().filter(|d| matches!(d, DepRecord::InstId { .. })).collect();
		assert_eq!(inst_ids.len(), 1);
		let DepRecord::InstId {
			source_path, ..
		} = inst_ids[0]
		else {
			unreachable!()
		};
		assert_eq!(source_path, "/refs:monitor/target");
	}

	#[test]
	fn test_rpc_deps_scoped_under_operation() {
		let deps = analyzed();
		let probe = deps.ops.iter().find(|op| op.path == "/refs:probe").unwrap();
		assert!(probe.deps.iter().any(|d| matches!(d, DepRecord::Leafref { .. })));
		// the rpc leafref must not leak into the data deps
		assert_eq!(deps.data.iter().filter(|d| matches!(d, DepRecord::Leafref { .. })).count(), 1);
	}

	#[test]
	fn test_foreign_modules_deduplicated() {
		let deps = analyzed();
		assert_eq!(deps.foreign_modules, vec!["ietf-interfaces".to_string()]);
	}
}

// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The operational composer.
//!
//! An operational read merges three layers in increasing precedence:
//! schema defaults (origin `default`), pull-provider contributions (origin
//! `dynamic`) and the persisted push-edit overlay (origin `intended`).
//! Providers are asked with a bounded wait; a missing or overrunning
//! provider contributes an empty subtree, never an error. Keyless-list and
//! duplicate-value entries merge positionally.

use std::sync::Arc;

use tracing::warn;
use yangstore_core::{
	interface::Datastore,
	path::DataPath,
	tree::{DataNode, DataTree},
};
use yangstore_schema::{ModuleSchema, NodeKind, SchemaNode};
use yangstore_subscription::call_with_timeout;
use yangstore_transaction::materialize_defaults;
use yangstore_type::Origin;

use crate::{Result, engine::EngineInner, read::matches_with_paths, session::Session};

/// Assemble the operational view of one module.
pub(crate) fn compose(engine: &Arc<EngineInner>, module: &str) -> Result<DataTree> {
	let ctx = engine.registry.context();
	let schema = ctx.get_module(module)?;

	// layer one: schema defaults
	let mut out = DataTree::new(module);
	materialize_defaults(&ctx, &mut out)?;
	for root in &mut out.roots {
		root.fill_origin(Origin::Default);
	}

	// layer two: pull providers, in registration order
	for provider in engine.subs.oper_providers(module) {
		let callback = provider.callback.clone();
		let path = provider.xpath.clone();
		let response = call_with_timeout(engine.config.provider_timeout, move || callback(&path));
		match response {
			Ok(Ok(mut contribution)) => {
				for root in &mut contribution.roots {
					root.fill_origin(Origin::Dynamic);
				}
				merge_layer(schema, &mut out.roots, &contribution.roots);
			}
			Ok(Err(err)) => {
				warn!("oper provider for '{}' failed: {err}", provider.xpath);
			}
			Err(err) => {
				// an overrunning provider yields an empty subtree
				warn!("oper provider for '{}' timed out: {err}", provider.xpath);
				provider.dead.store(true, std::sync::atomic::Ordering::Relaxed);
			}
		}
	}

	// layer three: the push-edit overlay
	let plugin = engine.registry.storage_plugin(module, Datastore::Operational)?;
	let mut overlay = plugin.load(module, Datastore::Operational, None)?;
	for root in &mut overlay.roots {
		root.fill_origin(Origin::Intended);
	}
	merge_layer(schema, &mut out.roots, &overlay.roots);

	// unspecified origins default to unknown
	for root in &mut out.roots {
		root.fill_origin(Origin::Unknown);
	}
	engine.subs.collect_dead();
	Ok(out)
}

/// Merge `src` into `dst` with `src` taking precedence. Keyed lists match
/// by key values, keyless lists and leaf-lists positionally.
fn merge_layer(module: &ModuleSchema, dst: &mut Vec<DataNode>, src: &[DataNode]) {
	let mut positions: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
	for node in src {
		let Some(schema) = module.top_data_node(&node.name) else {
			continue;
		};
		let position = positions.entry(node.name.as_str()).or_insert(0);
		*position += 1;
		merge_node(schema, dst, node, *position);
	}
}

fn merge_node(schema: &SchemaNode, dst: &mut Vec<DataNode>, src: &DataNode, src_position: usize) {
	let target = match &schema.kind {
		NodeKind::List {
			keys, ..
		} if !keys.is_empty() => dst.iter().position(|d| {
			d.name == src.name
				&& keys.iter().all(|key| {
					let a = d.child_leaf(key).and_then(|l| l.value.as_ref());
					let b = src.child_leaf(key).and_then(|l| l.value.as_ref());
					a.is_some() && a == b
				})
		}),
		NodeKind::List {
			..
		}
		| NodeKind::LeafList {
			..
		} => {
			// positional: the n-th source entry lands on the n-th
			// destination entry
			dst.iter()
				.enumerate()
				.filter(|(_, d)| d.name == src.name)
				.map(|(idx, _)| idx)
				.nth(src_position - 1)
		}
		_ => dst.iter().position(|d| d.name == src.name && d.module == src.module),
	};

	match target {
		None => dst.push(src.clone()),
		Some(idx) => {
			let node = &mut dst[idx];
			if schema.is_leaf() {
				node.value = src.value.clone();
				node.origin = src.origin.or(node.origin);
				node.from_default = false;
				return;
			}
			if node.origin.is_none() {
				node.origin = src.origin;
			}
			let mut positions: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
			for child in &src.children {
				let Some(child_schema) = schema.data_child(&child.name) else {
					continue;
				};
				let position = positions.entry(child.name.as_str()).or_insert(0);
				*position += 1;
				merge_node(child_schema, &mut node.children, child, *position);
			}
		}
	}
}

impl Session {
	/// Remove matching entries from this module's push-edit overlay without
	/// touching any stored configuration.
	pub fn discard_items(&mut self, xpath: &str) -> Result<()> {
		let path = DataPath::parse(xpath)?;
		let module = path.module().to_string();
		self.check_access(&module, true)?;
		let ctx = self.engine.registry.context();
		let plugin = self.engine.registry.storage_plugin(&module, Datastore::Operational)?;
		let mut overlay = plugin.load(&module, Datastore::Operational, None)?;

		let paths: Vec<DataPath> =
			matches_with_paths(&ctx, &overlay, &path)?.into_iter().map(|(path, _)| path).collect();
		// delete deepest positions first so positional paths stay valid
		for target in paths.iter().rev() {
			overlay.delete(target);
		}
		plugin.store(&module, Datastore::Operational, &overlay)
	}
}

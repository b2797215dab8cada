// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! RPC/action dispatch and notification delivery.

use tracing::{instrument, warn};
use yangstore_core::{
	interface::Timestamp,
	path::DataPath,
	tree::{DataNode, DataTree},
};
use yangstore_schema::{NodeKind, SchemaNode, validate::check_subtree};
use yangstore_subscription::{
	NotificationCallback, NotificationEvent, NotificationKind, SubscriptionId, call_with_timeout,
};
use yangstore_type::{Error, ErrorCode};

use crate::{Engine, Result, session::Session};

impl Engine {
	/// Invoke the rpc or action at `path` with `input` (a tree whose roots
	/// are the operation's input arguments). Returns the handler's output.
	#[instrument(name = "engine::send_rpc", skip(self, input))]
	pub fn send_rpc(&self, path: &str, input: DataTree) -> Result<DataTree> {
		let path = DataPath::parse(path)?;
		let ctx = self.context();
		let op = ctx.resolve(&path)?;
		if !matches!(op.kind, NodeKind::Rpc | NodeKind::Action) {
			return Err(Error::inval_arg(format!("'{path}' is not an rpc or action")));
		}

		check_operation_body(op, &input.roots, &path, true)?;

		let Some((_, handler)) = self.inner.subs.rpc_handler(&path) else {
			return Err(Error::unsupported(format!("no handler subscribed for '{path}'")));
		};
		let invocation = path.clone();
		let verdict = call_with_timeout(self.inner.config.commit.callback_timeout, move || {
			handler(&invocation, &input)
		});
		let output = match verdict {
			Ok(Ok(output)) => output,
			Ok(Err(err)) => {
				return Err(Error::with_items(
					ErrorCode::CallbackFailed,
					format!("rpc handler for '{path}' failed: {}", err.message),
					err.items,
				));
			}
			Err(err) => return Err(err),
		};

		check_operation_body(op, &output.roots, &path, false)?;
		Ok(output)
	}

	/// Deliver a notification: validate it, append it to the module's
	/// replay log when replay support is on, then fan it out.
	#[instrument(name = "engine::send_notification", skip(self, notification), fields(module = %notification.module))]
	pub fn send_notification(&self, notification: DataTree) -> Result<()> {
		let module = notification.module.clone();
		let record = self.inner.registry.record(&module)?;
		let ctx = self.context();
		let schema_module = ctx.get_module(&module)?;

		if notification.roots.len() != 1 {
			return Err(Error::inval_arg("a notification has exactly one top node"));
		}
		let top = &notification.roots[0];
		let schema = schema_module
			.notification(&top.name)
			.ok_or_else(|| Error::schema(format!("'{}' is not a notification of '{module}'", top.name)))?;
		let findings = check_subtree(schema, top, &format!("/{module}:{}", top.name));
		if !findings.is_empty() {
			return Err(Error::with_items(
				ErrorCode::ValidationFailed,
				"notification does not match its schema",
				findings,
			));
		}

		let timestamp = Timestamp::now();
		if record.replay.is_some() {
			self.inner.registry.notification_plugin(&module)?.append(&module, &notification, timestamp)?;
		}

		for (_, callback) in self.inner.subs.notification_subscribers(&module, &top.name) {
			callback(&NotificationEvent {
				kind: NotificationKind::Realtime,
				module: module.clone(),
				timestamp,
				tree: notification.clone(),
			});
		}
		Ok(())
	}
}

/// Validate the input (or output) arguments of an operation invocation.
fn check_operation_body(op: &SchemaNode, args: &[DataNode], path: &DataPath, input: bool) -> Result<()> {
	let block_kind = if input {
		NodeKind::Input
	} else {
		NodeKind::Output
	};
	let block = op.children.iter().find(|c| c.kind == block_kind);
	let mut items = Vec::new();
	for arg in args {
		let schema = block.and_then(|b| b.data_child(&arg.name));
		match schema {
			Some(schema) => {
				items.extend(check_subtree(schema, arg, &format!("{path}/{}", arg.name)));
			}
			None => {
				items.push(yangstore_type::ErrorItem::new(
					format!("{path}/{}", arg.name),
					"not an argument of this operation",
				));
			}
		}
	}
	if let Some(block) = block {
		for schema in block.data_children() {
			if schema.mandatory && !args.iter().any(|a| a.name == schema.name) {
				items.push(yangstore_type::ErrorItem::new(
					format!("{path}/{}", schema.name),
					"mandatory argument is missing",
				));
			}
		}
	}
	if items.is_empty() {
		Ok(())
	} else {
		Err(Error::with_items(
			ErrorCode::ValidationFailed,
			if input {
				"rpc input is invalid"
			} else {
				"rpc output is invalid"
			},
			items,
		))
	}
}

/// Register a notification subscriber, optionally replaying the stored log
/// from `replay_from` before live delivery starts.
pub(crate) fn subscribe_notification(
	engine: &Engine,
	module: &str,
	xpath: Option<&str>,
	replay_from: Option<Timestamp>,
	callback: NotificationCallback,
) -> Result<SubscriptionId> {
	let record = engine.inner.registry.record(module)?;
	let xpath = xpath.map(DataPath::parse).transpose()?;

	if let Some(from) = replay_from {
		if record.replay.is_none() {
			return Err(Error::unsupported(format!(
				"module '{module}' does not have replay support enabled"
			)));
		}
		let plugin = engine.inner.registry.notification_plugin(module)?;
		let now = Timestamp::now();
		let stored = match plugin.replay(module, from, now) {
			Ok(stored) => stored,
			Err(err) => {
				warn!("replay of '{module}' failed: {err}");
				Vec::new()
			}
		};
		for entry in stored {
			let top = entry.tree.roots.first().map(|n| n.name.clone()).unwrap_or_default();
			let matches = xpath.as_ref().is_none_or(|p| p.last().name == top || p.is_wildcard());
			if !matches {
				continue;
			}
			callback(&NotificationEvent {
				kind: NotificationKind::Replay,
				module: module.to_string(),
				timestamp: entry.timestamp,
				tree: entry.tree,
			});
		}
		callback(&NotificationEvent {
			kind: NotificationKind::ReplayComplete,
			module: module.to_string(),
			timestamp: now,
			tree: DataTree::new(module),
		});
	}

	Ok(engine.inner.subs.subscribe_notification(module, xpath, callback))
}

impl Session {
	/// Session-scoped rpc invocation.
	pub fn send_rpc(&self, path: &str, input: DataTree) -> Result<DataTree> {
		let parsed = DataPath::parse(path)?;
		self.check_access(parsed.module(), false)?;
		Engine {
			inner: self.engine.clone(),
		}
		.send_rpc(path, input)
	}

	/// Session-scoped notification delivery.
	pub fn send_notification(&self, notification: DataTree) -> Result<()> {
		self.check_access(&notification.module, false)?;
		Engine {
			inner: self.engine.clone(),
		}
		.send_notification(notification)
	}
}

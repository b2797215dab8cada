// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use event::{EventKind, EventMask, ModuleChangeEvent, NotificationEvent, NotificationKind};
pub use registry::{
	ChangeDispatchEntry, ModuleChangeCallback, NotificationCallback, OperProviderCallback, OperProviderEntry,
	RpcCallback, SubscriptionId, SubscriptionRegistry,
};
pub use timeout::call_with_timeout;

pub mod event;
pub mod registry;
pub mod timeout;

pub type Result<T> = std::result::Result<T, yangstore_type::Error>;

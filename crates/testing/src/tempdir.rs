// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Run `f` with a fresh directory, removing it afterwards regardless of the
/// outcome.
pub fn temp_dir<F, R>(f: F) -> R
where
	F: FnOnce(&Path) -> R,
{
	let dir = unique_dir();
	std::fs::create_dir_all(&dir).expect("create temp dir");
	let result = f(&dir);
	let _ = std::fs::remove_dir_all(&dir);
	result
}

fn unique_dir() -> PathBuf {
	let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
	std::env::temp_dir().join(format!("yangstore-test-{}-{}", std::process::id(), counter))
}

// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::cell::Cell;

/// Source of placeholder device keys for pending changes
///
/// The remote system swaps each placeholder for a real key when it commits the
/// change. Keys start at -1 and count down so no two pending devices share one.
#[derive(Debug)]
pub struct PlaceholderKeys {
    next: Cell<i32>,
}

impl Default for PlaceholderKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderKeys {
    pub fn new() -> Self {
        Self { next: Cell::new(-1) }
    }

    /// Hand out the next unused placeholder
    pub fn next_key(&self) -> i32 {
        let key = self.next.get();
        self.next.set(key - 1);
        key
    }
}

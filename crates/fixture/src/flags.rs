// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::collections::{BTreeMap, HashMap};

/// Receiver for feature flag overrides applied before a database test runs.
///
/// Implement this for the application's settings object so the fixture can
/// switch off features (authentication, for example) that would otherwise
/// interfere with direct database access.
pub trait FlagStore {
    /// Sets `flag` to `value`, replacing any previous value.
    fn set_flag(&mut self, flag: &str, value: bool);
}

impl FlagStore for HashMap<String, bool> {
    fn set_flag(&mut self, flag: &str, value: bool) {
        self.insert(flag.to_string(), value);
    }
}

impl FlagStore for BTreeMap<String, bool> {
    fn set_flag(&mut self, flag: &str, value: bool) {
        self.insert(flag.to_string(), value);
    }
}

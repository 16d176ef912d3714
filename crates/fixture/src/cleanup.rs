// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use tracing::{debug, warn};

use crate::error::FixtureError;

type CleanupAction<R> = Box<dyn FnOnce(&mut R) -> Result<(), FixtureError>>;

/// Ordered cleanup actions released in reverse registration order.
///
/// Every action runs even when an earlier one fails; failures are collected
/// into a single [`FixtureError::CleanupFailed`].
pub struct CleanupStack<R> {
    actions: Vec<(String, CleanupAction<R>)>,
}

impl<R> Default for CleanupStack<R> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<R> std::fmt::Debug for CleanupStack<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|(label, _)| label))
            .finish()
    }
}

impl<R> CleanupStack<R> {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action` to run at release time, before every action
    /// registered earlier.
    pub fn push<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce(&mut R) -> Result<(), FixtureError> + 'static,
    {
        self.actions.push((label.into(), Box::new(action)));
    }

    /// Number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no actions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs and removes every pending action, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::CleanupFailed`] listing every action that
    /// failed.
    pub fn run_all(&mut self, resource: &mut R) -> Result<(), FixtureError> {
        let mut failures = Vec::new();

        while let Some((label, action)) = self.actions.pop() {
            debug!(%label, "Running cleanup");
            if let Err(err) = action(resource) {
                warn!(%label, %err, "Cleanup action failed");
                failures.push(format!("{label}: {err}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::CleanupFailed(failures.join("; ")))
        }
    }
}

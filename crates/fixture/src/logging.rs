// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter for fixture tests.
pub const LOG_ENV: &str = "PRISTINE_LOG";

/// Installs a test-friendly `tracing` subscriber.
///
/// The filter comes from `PRISTINE_LOG` (for example `pristine=debug`) and
/// defaults to `warn`. Output goes through the test harness so it is only
/// shown for failing tests. Calling this more than once is harmless.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    // A subscriber may already be installed by an earlier test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .try_init();
}

// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

/// Install a logging subscriber that writes through the test harness.
///
/// Safe to call from many tests, only the first call has any effect.
pub fn init_logging() {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter("conc=trace,debug")
        .without_time()
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(sub);
}

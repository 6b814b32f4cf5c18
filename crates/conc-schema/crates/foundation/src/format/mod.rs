// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

/// Helper to hold values that affect the formatting of a change
pub struct FormatChangeOptions {
    pub verbosity: u32,
    pub level: u64,
}

impl Default for FormatChangeOptions {
    fn default() -> Self {
        Self {
            verbosity: 0,
            level: u64::MAX,
        }
    }
}

/// Render one solver decision for logs
pub trait FormatChange {
    type State;

    fn format_change(
        &self,
        format_settings: &FormatChangeOptions,
        state: Option<&Self::State>,
    ) -> String;
}

/// Render an error with more or less detail depending on verbosity
pub trait FormatError {
    fn format_error(&self, verbosity: u32) -> String;
}

pub trait FormatSolution {
    fn format_solution(&self, verbosity: u32) -> String;
}

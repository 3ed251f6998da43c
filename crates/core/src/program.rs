// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Program definitions and launch-template expansion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default placeholder delimiter in run and launch templates.
pub const DEFAULT_TEMPLATE_DELIMITER: &str = "$$";

fn default_delimiter() -> String {
    DEFAULT_TEMPLATE_DELIMITER.to_string()
}

/// A program that can run on a queue.
///
/// `run_template` is expanded per submission by substituting
/// `delimiter + key + delimiter` sequences; keys with no binding are left
/// literal so a template can carry shell `$$` text untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub run_template: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// When true the expanded command runs directly, without a launch script.
    #[serde(default)]
    pub run_direct: bool,
}

impl Program {
    pub fn new(name: impl Into<String>, run_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_template: run_template.into(),
            delimiter: default_delimiter(),
            variables: HashMap::new(),
            run_direct: false,
        }
    }

    /// The run template with this program's static variables substituted.
    pub fn expanded_run_template(&self) -> String {
        expand_template(&self.run_template, &self.delimiter, &self.variables)
    }

    /// Expand with per-submission bindings layered over the static variables.
    pub fn expand_with(&self, extra: &HashMap<String, String>) -> String {
        let expanded = self.expanded_run_template();
        expand_template(&expanded, &self.delimiter, extra)
    }
}

/// Substitute `delimiter + key + delimiter` for each binding in `vars`.
/// Sequences naming an unbound key are left literal.
pub fn expand_template(
    template: &str,
    delimiter: &str,
    vars: &HashMap<String, String>,
) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        let needle = format!("{delimiter}{key}{delimiter}");
        out = out.replace(&needle, value);
    }
    out
}

#[cfg(test)]
#[path = "program_tests.rs"]
mod tests;

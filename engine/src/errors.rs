// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::cell::RefCell;

use thiserror::Error;

/// Fatal generator errors. Anything here aborts the run after the file
/// writer flushes; warnings go through [`Diagnostics`] instead.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("Bad generator configuration: {0}")]
    Configuration(String),
    #[error("Unresolved type for {context} in function '{signature}'")]
    UnresolvedType { signature: String, context: String },
    #[error(
        "No way to call '{signature}' with the modifications described in the type system: \
         argument {index} was removed but has no default value and no injected code covers the call"
    )]
    RemovedArgumentUncovered { signature: String, index: usize },
    #[error(
        "Can't write the C++ to Python conversion function for container type '{0}': \
         no conversion rule was defined for it in the type system"
    )]
    ContainerWithoutConversionRule(String),
    #[error(
        "User added implicit conversion for C++ type '{0}' must provide either an input \
         type check function or a non-primitive source type entry"
    )]
    CustomConversionWithoutCheck(String),
    #[error("Unresolved placeholder '{placeholder}' in code snippet of '{context}'")]
    UnresolvedPlaceholder {
        placeholder: String,
        context: String,
    },
    #[error("I/O error writing generated files: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal finding, reported at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
}

/// Shared diagnostics sink. Interior mutability keeps warning emission
/// available from deep inside otherwise-borrowed emitter state.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: RefCell<Vec<Warning>>,
    /// Warnings matching these substrings count as known issues in the
    /// end-of-run summary (they are still printed).
    allow_list: Vec<String>,
    graph_dumps: RefCell<Vec<(String, String)>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allow_list(allow_list: Vec<String>) -> Self {
        Diagnostics {
            allow_list,
            ..Self::default()
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.warnings.borrow_mut().push(Warning { message });
    }

    /// Attach a Graphviz dump for a cyclic dependency report.
    pub fn dump_graph(&self, name: impl Into<String>, dot: String) {
        self.graph_dumps.borrow_mut().push((name.into(), dot));
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.borrow().clone()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.borrow().len()
    }

    pub fn graph_dumps(&self) -> Vec<(String, String)> {
        self.graph_dumps.borrow().clone()
    }

    /// The one-line summary printed by the driver.
    pub fn summary(&self) -> String {
        let total = self.warning_count();
        let known = self
            .warnings
            .borrow()
            .iter()
            .filter(|w| self.allow_list.iter().any(|a| w.message.contains(a)))
            .count();
        format!("{} warnings ({} known issues)", total, known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_known_issues() {
        let diags = Diagnostics::with_allow_list(vec!["deprecated".into()]);
        diags.warn("function f() is deprecated");
        diags.warn("cyclic dependency on overload data for 'g'");
        assert_eq!(diags.summary(), "2 warnings (1 known issues)");
    }
}

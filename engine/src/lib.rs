// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The binding code generator core: consumes a read-only `ApiModel` and
//! `TypeSystem` (from `sbkgen-model`) and emits the C++ source of a
//! CPython extension module that exposes the described API, ready to be
//! compiled against the Shiboken runtime support library.
//!
//! The generator is single-run and single-threaded; for the same input
//! it produces byte-identical output, and [`write_to_directory`] only
//! touches files whose content actually changed.

mod codegen;
mod errors;
mod file_writer;
mod writer;

use std::path::Path;

use sbkgen_model::{ApiModel, TypeSystem};

pub use crate::errors::{Diagnostics, GenError, Warning};
pub use crate::file_writer::{GeneratedFile, WriteOutcome};
pub use codegen::EmitCtx;

/// Options accepted from the embedding driver.
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// Avoid the inline-protected-access hack; protected members are
    /// reached through the wrapper subclass instead.
    pub avoid_protected_hack: bool,
    /// Parent a constructed object to a constructor argument named
    /// `parent` when no explicit ownership rule says otherwise.
    pub enable_parent_ctor_heuristic: bool,
    /// Parent a returned pointer-to-wrapper to `self` when no explicit
    /// ownership rule says otherwise.
    pub enable_return_value_heuristic: bool,
    /// Emit the QObject/meta-object integration points.
    pub enable_pyside_extensions: bool,
    /// Emit compact TypeError messages without the overload listing.
    pub disable_verbose_error_messages: bool,
    /// Use an `isNull()` const method as the Python boolean protocol.
    pub use_isnull_as_nb_nonzero: bool,
    /// Verbatim text prepended to every emitted file.
    pub license_text: Option<String>,
    /// Warnings containing any of these substrings count as known
    /// issues in the end-of-run summary.
    pub warning_allow_list: Vec<String>,
}

/// The outcome of a generator run: the staged files plus diagnostics.
pub struct GeneratedBindings {
    pub files: Vec<GeneratedFile>,
    pub warnings: Vec<Warning>,
    pub summary: String,
}

/// Run the generator core over one module. Pure: no files are touched.
pub fn generate(
    model: &ApiModel,
    ts: &TypeSystem,
    config: &GeneratorConfig,
) -> Result<GeneratedBindings, GenError> {
    let diags = Diagnostics::with_allow_list(config.warning_allow_list.clone());
    let ctx = EmitCtx::new(model, ts, config, &diags);
    let files = codegen::generate_module(&ctx)?;
    Ok(GeneratedBindings {
        files,
        warnings: diags.warnings(),
        summary: diags.summary(),
    })
}

/// Commit staged files under `output_dir`; returns how many files were
/// actually (re)written. Unchanged files are left untouched so
/// incremental builds stay quiet.
pub fn write_to_directory(
    bindings: &GeneratedBindings,
    output_dir: &Path,
) -> Result<usize, GenError> {
    Ok(file_writer::commit_all(output_dir, &bindings.files)?)
}

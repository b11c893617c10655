// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The code generator core. [`EmitCtx`] bundles the immutable inputs and
//! the diagnostics sink and is threaded explicitly through every emitter
//! instead of living in globals.

pub(crate) mod classes;
pub(crate) mod classify;
pub(crate) mod converters;
pub(crate) mod enums;
pub(crate) mod functions;
pub(crate) mod graph;
pub(crate) mod module;
pub(crate) mod names;
pub(crate) mod overloads;
pub(crate) mod snippets;

#[cfg(test)]
pub(crate) mod test_fixtures;

use sbkgen_model::{ApiModel, TypeSystem};

use crate::errors::{Diagnostics, GenError};
use crate::file_writer::GeneratedFile;
use crate::GeneratorConfig;

/// Everything an emitter needs to see: the read-only model and type
/// system, the generator options, and the diagnostics sink.
#[derive(Clone, Copy)]
pub struct EmitCtx<'a> {
    pub model: &'a ApiModel,
    pub ts: &'a TypeSystem,
    pub config: &'a GeneratorConfig,
    pub diags: &'a Diagnostics,
}

impl<'a> EmitCtx<'a> {
    pub fn new(
        model: &'a ApiModel,
        ts: &'a TypeSystem,
        config: &'a GeneratorConfig,
        diags: &'a Diagnostics,
    ) -> Self {
        EmitCtx {
            model,
            ts,
            config,
            diags,
        }
    }

    /// The directory (relative to the output root) this module's files
    /// land in, one path segment per package component.
    pub fn package_path(&self) -> String {
        self.ts.package.replace('.', "/")
    }

    /// Whether a C++ subclass is emitted for the class, to intercept
    /// virtual calls and reach protected members.
    pub fn should_generate_cpp_wrapper(&self, class_id: sbkgen_model::ClassId) -> bool {
        let class = self.model.class(class_id);
        if class.is_namespace || class.has_private_destructor {
            return false;
        }
        if !self.ts.entry(class.entry).generate_wrapper() {
            return false;
        }
        let has_virtuals = class
            .functions
            .iter()
            .any(|&f| self.model.function(f).flags.is_virtual);
        let has_protected = class.has_protected_fields()
            || class.has_protected_destructor
            || class
                .functions
                .iter()
                .any(|&f| self.model.function(f).flags.is_protected);
        class.is_polymorphic
            || has_virtuals
            || class.has_virtual_destructor
            || (self.config.avoid_protected_hack && has_protected)
    }

    /// The C++ type actually instantiated for the class: the wrapper
    /// subclass when one exists, the plain class otherwise.
    pub fn effective_class_cpp_name(&self, class_id: sbkgen_model::ClassId) -> String {
        let class = self.model.class(class_id);
        if self.should_generate_cpp_wrapper(class_id) {
            self.wrapper_name(class)
        } else {
            class.qualified_cpp_name.clone()
        }
    }

    /// Prepend the license header, if one was configured.
    fn with_license(&self, content: String) -> String {
        match &self.config.license_text {
            Some(license) => format!("{}\n{}", license.trim_end(), content),
            None => content,
        }
    }
}

/// Generate every output file for the module described by `ctx`:
/// per-class wrapper pairs, the module translation unit and the module
/// header.
pub fn generate_module(ctx: &EmitCtx) -> Result<Vec<GeneratedFile>, GenError> {
    let mut files = Vec::new();
    let dir = ctx.package_path();

    for &class_id in &ctx.model.classes_topological_sorted() {
        let class = ctx.model.class(class_id);
        if !ctx.ts.entry(class.entry).generate_wrapper() {
            continue;
        }
        let stem = ctx.file_name_for_class(class);
        let header = classes::generate_class_header(ctx, class_id)?;
        files.push(GeneratedFile::new(
            format!("{}/{}.h", dir, stem),
            ctx.with_license(header),
        ));
        let unit = classes::generate_class_unit(ctx, class_id)?;
        files.push(GeneratedFile::new(
            format!("{}/{}.cpp", dir, stem),
            ctx.with_license(unit),
        ));
    }

    let module_lower = ctx.ts.module_name.to_lowercase();
    files.push(GeneratedFile::new(
        format!("{}/{}_python.h", dir, module_lower),
        ctx.with_license(module::generate_module_header(ctx)?),
    ));
    files.push(GeneratedFile::new(
        format!("{}/{}_module_wrapper.cpp", dir, module_lower),
        ctx.with_license(module::generate_module_unit(ctx)?),
    ));

    Ok(files)
}

// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Module-level output: the module header with its stable index macro
//! set, and the module translation unit whose init routine wires
//! everything together in dependency order.

use indexmap::IndexMap;
use itertools::Itertools;

use sbkgen_model::{
    AbstractType, ClassId, Language, SnipPosition, TypeEntryId, TypeEntryKind,
};

use super::converters;
use super::enums;
use super::functions;
use super::names::{converters_variable_name, cpp_api_variable_name};
use super::overloads::OverloadData;
use super::snippets::{self, SnippetEnv};
use super::EmitCtx;
use crate::errors::GenError;
use crate::writer::CppWriter;

/// The stable, contiguous type-index assignment of one module: classes
/// in arena order, each followed by its enums and their flags, then
/// global enums. Identical inputs yield identical indices.
pub(crate) struct TypeIndexes {
    by_entry: IndexMap<TypeEntryId, usize>,
    count: usize,
    converter_entries: Vec<TypeEntryId>,
    containers: Vec<AbstractType>,
}

impl TypeIndexes {
    pub fn build(ctx: &EmitCtx) -> Self {
        let mut by_entry = IndexMap::new();
        let mut next = 0usize;
        let mut add = |entry: TypeEntryId, by_entry: &mut IndexMap<TypeEntryId, usize>| {
            if !by_entry.contains_key(&entry) {
                by_entry.insert(entry, next);
                next += 1;
            }
        };
        for (_, class) in ctx.model.classes() {
            if !ctx.ts.entry(class.entry).generate_wrapper() {
                continue;
            }
            add(class.entry, &mut by_entry);
            for &enum_id in &class.enums {
                let entity = ctx.model.enum_entity(enum_id);
                if entity.is_anonymous {
                    continue;
                }
                add(entity.entry, &mut by_entry);
                if let TypeEntryKind::Enum {
                    flags: Some(flags), ..
                } = &ctx.ts.entry(entity.entry).kind
                {
                    add(*flags, &mut by_entry);
                }
            }
        }
        for &enum_id in &ctx.model.global_enums {
            let entity = ctx.model.enum_entity(enum_id);
            if entity.is_anonymous {
                continue;
            }
            add(entity.entry, &mut by_entry);
            if let TypeEntryKind::Enum {
                flags: Some(flags), ..
            } = &ctx.ts.entry(entity.entry).kind
            {
                add(*flags, &mut by_entry);
            }
        }
        let count = by_entry.len();

        let converter_entries: Vec<TypeEntryId> = ctx
            .ts
            .primitive_types()
            .filter(|(_, e)| e.generate_wrapper() && e.custom_conversion.is_some())
            .map(|(id, _)| id)
            .collect();
        let containers = ctx.model.all_instantiated_containers(ctx.ts);

        TypeIndexes {
            by_entry,
            count,
            converter_entries,
            containers,
        }
    }

    pub fn converter_count(&self) -> usize {
        // A zero-length array would not compile on every platform.
        (self.converter_entries.len() + self.containers.len()).max(1)
    }
}

/// The implicit conversions this module provides for types owned by
/// other modules: conversion operators on local classes yielding an
/// external wrapper type.
fn extended_converters(ctx: &EmitCtx) -> IndexMap<TypeEntryId, Vec<ClassId>> {
    let mut result: IndexMap<TypeEntryId, Vec<ClassId>> = IndexMap::new();
    for (class_id, class) in ctx.model.classes() {
        if !ctx.ts.entry(class.entry).generate_wrapper() {
            continue;
        }
        for &fid in &class.functions {
            let func = ctx.model.function(fid);
            if !func.is_conversion_operator() || func.flags.is_user_added {
                continue;
            }
            let Some(ret) = &func.return_type else {
                continue;
            };
            let target = ctx.ts.entry(ret.entry);
            if target.is_complex() && !target.generate_wrapper() && ctx.ts.is_external(ret.entry)
            {
                result.entry(ret.entry).or_default().push(class_id);
            }
        }
    }
    result
}

// ---------------------------------------------------------------------
// Module header
// ---------------------------------------------------------------------

pub(crate) fn generate_module_header(ctx: &EmitCtx) -> Result<String, GenError> {
    let module = &ctx.ts.module_name;
    let guard = format!("SBK_{}_PYTHON_H", module.to_uppercase());
    let indexes = TypeIndexes::build(ctx);
    let mut w = CppWriter::new();

    w.line(&format!("#ifndef {}", guard));
    w.line(&format!("#define {}", guard));
    w.blank();
    if !ctx.config.avoid_protected_hack {
        w.line("//workaround to access protected functions");
        w.line("#define protected public");
        w.blank();
    }

    w.line("#include <sbkpython.h>");
    w.line("#include <conversions.h>");
    w.line("#include <sbkenum.h>");
    w.line("#include <basewrapper.h>");
    w.line("#include <bindingmanager.h>");
    w.line("#include <memory>");
    w.blank();
    if ctx.config.enable_pyside_extensions {
        w.line("#include <pysidesignal.h>");
    }

    let required = ctx.ts.required_target_imports();
    if !required.is_empty() {
        w.line("// Module Includes");
        for module in required {
            w.line(&format!("#include <{}_python.h>", module.to_lowercase()));
        }
        w.blank();
    }

    w.line("// Binded library includes");
    let mut includes: Vec<String> = Vec::new();
    for (_, entry) in ctx.ts.entries() {
        if !entry.generate_wrapper() {
            continue;
        }
        if let Some(include) = &entry.include {
            let statement = include.statement();
            if !includes.contains(&statement) {
                includes.push(statement);
            }
        }
    }
    for include in &includes {
        w.line(include);
    }
    w.blank();

    // Type indices.
    w.line("// Type indices");
    for (&entry_id, &index) in &indexes.by_entry {
        w.line(&format!(
            "#define {:<60} {}",
            ctx.type_index_variable_entry(entry_id),
            index
        ));
        // A typedef of a container instantiation also publishes the
        // alias index macro.
        if let Some(data) = ctx.ts.entry(entry_id).complex_data() {
            if data.base_container.is_some() {
                if let Some(class_id) = ctx.model.find_class_by_entry(entry_id) {
                    if let Some(alias) = container_alias_index_variable(ctx, class_id) {
                        w.line(&format!("#define {:<60} {}", alias, index));
                    }
                }
            }
        }
    }
    w.line(&format!(
        "#define {:<60} {}",
        format!("SBK_{}_IDX_COUNT", module),
        indexes.count
    ));
    w.blank();
    w.line("// This variable stores all Python types exported by this module.");
    w.line(&format!(
        "extern PyTypeObject** {};",
        cpp_api_variable_name(&ctx.ts.package)
    ));
    w.blank();
    w.line("// This variable stores all type converters exported by this module.");
    w.line(&format!(
        "extern SbkConverter** {};",
        converters_variable_name(&ctx.ts.package)
    ));
    w.blank();

    w.line("// Converter indices");
    let mut converter_index = 0usize;
    for &entry_id in &indexes.converter_entries {
        w.line(&format!(
            "#define {:<60} {}",
            ctx.type_index_variable_entry(entry_id),
            converter_index
        ));
        converter_index += 1;
    }
    for container in &indexes.containers {
        w.line(&format!(
            "#define {:<60} {} // {}",
            ctx.type_index_variable(container),
            converter_index,
            container.cpp_signature(ctx.ts)
        ));
        converter_index += 1;
    }
    w.line(&format!(
        "#define {:<60} {}",
        format!("SBK_{}_CONVERTERS_IDX_COUNT", module),
        indexes.converter_count()
    ));
    w.blank();

    w.line("namespace Shiboken");
    w.line("{");
    w.blank();
    w.line("// PyType functions, to get the PyObjectType for a type T");
    for &enum_id in &ctx.model.global_enums {
        write_sbk_type_function_for_enum(&mut w, ctx, enum_id);
    }
    for (_, class) in ctx.model.classes() {
        if !ctx.ts.entry(class.entry).generate_wrapper() {
            continue;
        }
        for &enum_id in &class.enums {
            write_sbk_type_function_for_enum(&mut w, ctx, enum_id);
        }
        if !class.is_namespace {
            w.line(&format!(
                "template<> inline PyTypeObject* SbkType< ::{} >() {{ return reinterpret_cast<PyTypeObject*>({}); }}",
                class.qualified_cpp_name,
                ctx.py_type_object_ext_entry(class.entry)
            ));
        }
    }
    w.blank();
    w.line("} // namespace Shiboken");
    w.blank();
    w.line(&format!("#endif // {}", guard));
    w.blank();
    Ok(w.into_string())
}

fn container_alias_index_variable(ctx: &EmitCtx, class_id: ClassId) -> Option<String> {
    let class = ctx.model.class(class_id);
    let base_container = ctx
        .ts
        .entry(class.entry)
        .complex_data()
        .and_then(|d| d.base_container)?;
    let base_name = super::names::fixed_name(&ctx.ts.entry(base_container).qualified_cpp_name)
        .to_uppercase();
    Some(format!("SBK_{}_IDX", base_name))
}

fn write_sbk_type_function_for_enum(w: &mut CppWriter, ctx: &EmitCtx, enum_id: sbkgen_model::EnumId) {
    let entity = ctx.model.enum_entity(enum_id);
    if entity.is_anonymous {
        return;
    }
    let entry = ctx.ts.entry(entity.entry);
    w.line(&format!(
        "template<> inline PyTypeObject* SbkType< ::{} >() {{ return {}; }}",
        entry.qualified_cpp_name,
        ctx.py_type_object_ext_entry(entity.entry)
    ));
    if let TypeEntryKind::Enum {
        flags: Some(flags), ..
    } = &entry.kind
    {
        w.line(&format!(
            "template<> inline PyTypeObject* SbkType< ::{} >() {{ return {}; }}",
            ctx.ts.entry(*flags).qualified_cpp_name,
            ctx.py_type_object_ext_entry(*flags)
        ));
    }
}

// ---------------------------------------------------------------------
// Module translation unit
// ---------------------------------------------------------------------

fn module_snippet_env(ctx: &EmitCtx) -> SnippetEnv {
    SnippetEnv {
        py_self: "self".to_string(),
        py_return_var: "pyResult".to_string(),
        context: format!("module {}", ctx.ts.module_name),
        ..Default::default()
    }
}

pub(crate) fn generate_module_unit(ctx: &EmitCtx) -> Result<String, GenError> {
    let module = &ctx.ts.module_name;
    let indexes = TypeIndexes::build(ctx);
    let mut w = CppWriter::new();
    let env = module_snippet_env(ctx);

    w.line("#include <sbkpython.h>");
    w.line("#include <shiboken.h>");
    w.line("#include <algorithm>");
    if ctx.config.enable_pyside_extensions {
        w.line("#include <pyside.h>");
    }
    w.line(&format!("#include \"{}_python.h\"", module.to_lowercase()));
    w.blank();
    w.line("// Extra includes");
    let mut extra: Vec<String> = ctx
        .ts
        .extra_includes
        .iter()
        .map(|i| i.statement())
        .collect();
    extra.sort();
    for include in extra {
        w.line(&include);
    }
    w.blank();

    w.line("// Current module's type array.");
    w.line(&format!(
        "PyTypeObject** {};",
        cpp_api_variable_name(&ctx.ts.package)
    ));
    w.line("// Current module's converter array.");
    w.line(&format!(
        "SbkConverter** {};",
        converters_variable_name(&ctx.ts.package)
    ));

    // Module native/beginning snippets.
    for snip in ctx
        .ts
        .code_snips
        .iter()
        .filter(|s| s.position == SnipPosition::Beginning && s.language.covers(Language::Native))
    {
        snippets::write_snippet(&mut w, ctx, &env, &snip.code)?;
    }
    w.blank();

    if ctx.config.enable_pyside_extensions {
        // Breaking staticMetaObject reference cycles at teardown.
        w.line("void cleanTypesAttributes(void) {");
        w.indent();
        w.line(&format!(
            "for (int i = 0, imax = SBK_{}_IDX_COUNT; i < imax; i++) {{",
            module
        ));
        w.indent();
        w.line(&format!(
            "PyObject* pyType = reinterpret_cast<PyObject*>({}[i]);",
            cpp_api_variable_name(&ctx.ts.package)
        ));
        w.line("if (pyType && PyObject_HasAttrString(pyType, \"staticMetaObject\"))");
        w.indented(|x| {
            x.line("PyObject_SetAttrString(pyType, \"staticMetaObject\", Py_None);")
        });
        w.dedent();
        w.line("}");
        w.dedent();
        w.line("}");
        w.blank();
    }

    // Global function wrappers and their method table.
    w.line("// Global functions ------------------------------------------------------------");
    let mut global_method_defs = CppWriter::new();
    let mut groups: IndexMap<String, Vec<sbkgen_model::FunctionId>> = IndexMap::new();
    for &fid in &ctx.model.global_functions {
        let func = ctx.model.function(fid);
        if func.flags.is_modified_removed {
            continue;
        }
        groups.entry(func.name.clone()).or_default().push(fid);
    }
    for (_, overloads) in &groups {
        functions::write_method_wrapper(&mut w, ctx, overloads)?;
        let data = OverloadData::new(ctx, overloads);
        let func = ctx.model.function(data.reference_function());
        let use_py_args = data.uses_py_args(ctx);
        let flags = if data.min_args == data.max_args && data.max_args < 2 && !use_py_args {
            if data.max_args == 0 {
                "METH_NOARGS".to_string()
            } else {
                "METH_O".to_string()
            }
        } else {
            let mut f = "METH_VARARGS".to_string();
            if data.has_argument_with_default_value(ctx) {
                f.push_str("|METH_KEYWORDS");
            }
            f
        };
        global_method_defs.line(&format!(
            "    {{\"{}\", (PyCFunction){}, {}}},",
            func.name,
            ctx.cpython_function_name(func),
            flags
        ));
    }
    w.blank();
    w.line(&format!("static PyMethodDef {}_methods[] = {{", module));
    w.append(global_method_defs);
    w.line("    {0} // Sentinel");
    w.line("};");
    w.blank();

    // Per-class init routine declarations.
    w.line("// Classes initialization functions ------------------------------------------------------------");
    let sorted_classes = module_class_order(ctx);
    for &class_id in &sorted_classes {
        let class = ctx.model.class(class_id);
        if !ctx.ts.entry(class.entry).generate_wrapper() {
            continue;
        }
        w.line(&format!(
            "void {}(PyObject* module);",
            ctx.class_init_function_name(class)
        ));
    }
    w.blank();

    // Global enum converter functions.
    if !ctx.model.global_enums.is_empty() {
        w.line("// Enum definitions ------------------------------------------------------------");
        for &enum_id in &ctx.model.global_enums {
            enums::write_enum_converter_functions(&mut w, ctx, enum_id)?;
            w.blank();
        }
    }

    // Required modules' extern arrays.
    let required = ctx.ts.required_target_imports().to_vec();
    if !required.is_empty() {
        w.line("// Required modules' type and converter arrays.");
        for required_module in &required {
            w.line(&format!(
                "PyTypeObject** {};",
                cpp_api_variable_name(required_module)
            ));
            w.line(&format!(
                "SbkConverter** {};",
                converters_variable_name(required_module)
            ));
        }
        w.blank();
    }

    w.line("// Module initialization ------------------------------------------------------------");
    let extended = extended_converters(ctx);
    if !extended.is_empty() {
        w.blank();
        w.line("// Extended Converters.");
        w.blank();
        for (&external, sources) in &extended {
            w.line(&format!(
                "// Extended implicit conversions for {}.{}.",
                ctx.ts.entry(external).package,
                ctx.ts.entry(external).target_lang_name
            ));
            for &source in sources {
                write_extended_conversion_functions(&mut w, ctx, source, external);
            }
        }
    }

    if !indexes.converter_entries.is_empty() {
        w.blank();
        w.line("// Primitive Type converters.");
        w.blank();
        for &entry_id in &indexes.converter_entries {
            let entry = ctx.ts.entry(entry_id);
            w.line(&format!(
                "// C++ to Python conversion for type '{}'.",
                entry.qualified_cpp_name
            ));
            let custom = entry.custom_conversion.as_ref().expect("filtered above");
            write_primitive_cpp_to_python(&mut w, ctx, entry_id);
            converters::write_custom_converter_functions(&mut w, ctx, custom, entry_id)?;
        }
        w.blank();
    }

    if !indexes.containers.is_empty() {
        w.line("// Container Type converters.");
        w.blank();
        for container in &indexes.containers {
            w.line(&format!(
                "// C++ to Python conversion for type '{}'.",
                container.cpp_signature(ctx.ts)
            ));
            converters::write_container_converter_functions(&mut w, ctx, container)?;
        }
        w.blank();
    }

    w.line("#if defined _WIN32 || defined __CYGWIN__");
    w.line("    #define SBK_EXPORT_MODULE __declspec(dllexport)");
    w.line("#elif __GNUC__ >= 4");
    w.line("    #define SBK_EXPORT_MODULE __attribute__ ((visibility(\"default\")))");
    w.line("#else");
    w.line("    #define SBK_EXPORT_MODULE");
    w.line("#endif");
    w.blank();
    w.line("#ifdef IS_PY3K");
    w.line("static struct PyModuleDef moduledef = {");
    w.line("    /* m_base     */ PyModuleDef_HEAD_INIT,");
    w.line(&format!("    /* m_name     */ \"{}\",", module));
    w.line("    /* m_doc      */ 0,");
    w.line("    /* m_size     */ -1,");
    w.line(&format!("    /* m_methods  */ {}_methods,", module));
    w.line("    /* m_reload   */ 0,");
    w.line("    /* m_traverse */ 0,");
    w.line("    /* m_clear    */ 0,");
    w.line("    /* m_free     */ 0");
    w.line("};");
    w.blank();
    w.line("#endif");
    w.line(&format!("SBK_MODULE_INIT_FUNCTION_BEGIN({})", module));
    w.indent();

    let ec = "SBK_MODULE_INIT_ERROR";

    // 1. Module target/beginning snippets.
    for snip in ctx
        .ts
        .code_snips
        .iter()
        .filter(|s| s.position == SnipPosition::Beginning && s.language.covers(Language::Target))
    {
        snippets::write_snippet(&mut w, ctx, &env, &snip.code)?;
    }

    // 2. Import required modules and bind their arrays.
    for required_module in &required {
        w.open_block("");
        w.line(&format!(
            "Shiboken::AutoDecRef requiredModule(Shiboken::Module::import(\"{}\"));",
            required_module
        ));
        w.line("if (requiredModule.isNull())");
        w.indented(|x| x.line(&format!("return {};", ec)));
        w.line(&format!(
            "{} = Shiboken::Module::getTypes(requiredModule);",
            cpp_api_variable_name(required_module)
        ));
        w.line(&format!(
            "{} = Shiboken::Module::getTypeConverters(requiredModule);",
            converters_variable_name(required_module)
        ));
        w.close_block("");
        w.blank();
    }

    // 3. / 4. The module's own arrays.
    if indexes.count > 0 {
        w.line("// Create an array of wrapper types for the current module.");
        w.line(&format!(
            "static PyTypeObject* cppApi[SBK_{}_IDX_COUNT];",
            module
        ));
        w.line(&format!("{} = cppApi;", cpp_api_variable_name(&ctx.ts.package)));
        w.blank();
    }
    w.line("// Create an array of primitive type converters for the current module.");
    w.line(&format!(
        "static SbkConverter* sbkConverters[SBK_{}_CONVERTERS_IDX_COUNT];",
        module
    ));
    w.line(&format!(
        "{} = sbkConverters;",
        converters_variable_name(&ctx.ts.package)
    ));
    w.blank();

    // 5. The module object itself.
    w.dedent();
    w.line("#ifdef IS_PY3K");
    w.indent();
    w.line(&format!(
        "PyObject* module = Shiboken::Module::create(\"{}\", &moduledef);",
        module
    ));
    w.dedent();
    w.line("#else");
    w.indent();
    w.line(&format!(
        "PyObject* module = Shiboken::Module::create(\"{}\", {}_methods);",
        module, module
    ));
    w.dedent();
    w.line("#endif");
    w.indent();
    w.blank();

    // 6. Class init calls in dependency order.
    w.line("// Initialize classes in the type system");
    for &class_id in &sorted_classes {
        let class = ctx.model.class(class_id);
        if !ctx.ts.entry(class.entry).generate_wrapper() {
            continue;
        }
        let scope = match class.enclosing_class {
            Some(enclosing)
                if ctx
                    .ts
                    .entry(ctx.model.class(enclosing).entry)
                    .generate_wrapper() =>
            {
                format!(
                    "{}->tp_dict",
                    ctx.py_type_object_ext_entry(ctx.model.class(enclosing).entry)
                )
            }
            _ => "module".to_string(),
        };
        w.line(&format!(
            "{}({});",
            ctx.class_init_function_name(class),
            scope
        ));
    }
    w.blank();

    // 7. Primitive converters (with aliases).
    for &entry_id in &indexes.converter_entries {
        write_primitive_converter_initialization(&mut w, ctx, entry_id);
        w.blank();
    }
    w.line("// Register primitive types converters.");
    for (id, entry) in ctx.ts.primitive_types() {
        if !entry.is_cpp_primitive() {
            continue;
        }
        let resolved = ctx.ts.basic_aliased_entry(id);
        if resolved == id {
            continue;
        }
        let converter = ctx.converter_object_entry(resolved);
        let segments: Vec<&str> = entry.qualified_cpp_name.split("::").collect();
        for start in 0..segments.len() {
            w.line(&format!(
                "Shiboken::Conversions::registerConverterName({}, \"{}\");",
                converter,
                segments[start..].join("::")
            ));
        }
    }
    w.blank();

    // 8. Instantiated container converters.
    for container in &indexes.containers {
        write_container_converter_initialization(&mut w, ctx, container);
        w.blank();
    }

    // 9. Extended (cross-module) converters.
    for (&external, sources) in &extended {
        w.line(&format!(
            "// Extended implicit conversions for {}.{}.",
            ctx.ts.entry(external).package,
            ctx.ts.entry(external).target_lang_name
        ));
        for &source in sources {
            let converter_var = format!(
                "(SbkObjectType*){}",
                ctx.py_type_object_ext_entry(external)
            );
            let source_name =
                ctx.fixed_type_name_entry(ctx.model.class(source).entry, None);
            let target_name = ctx.fixed_type_name_entry(external, None);
            converters::write_add_python_to_cpp_conversion(
                &mut w,
                &converter_var,
                &ctx.python_to_cpp_fn(&source_name, &target_name),
                &ctx.is_convertible_fn(&source_name, &target_name),
            );
        }
        w.blank();
    }

    // 10. Global enums.
    if !ctx.model.global_enums.is_empty() {
        w.line("// Initialization of enums.");
        w.blank();
        for &enum_id in &ctx.model.global_enums {
            enums::write_enum_initialization(&mut w, ctx, enum_id, "module", ec)?;
        }
    }

    // 11. Publish the module to the runtime.
    if indexes.count > 0 {
        w.line(&format!(
            "Shiboken::Module::registerTypes(module, {});",
            cpp_api_variable_name(&ctx.ts.package)
        ));
    }
    w.line(&format!(
        "Shiboken::Module::registerTypeConverters(module, {});",
        converters_variable_name(&ctx.ts.package)
    ));
    w.blank();
    w.open_block("if (PyErr_Occurred())");
    w.line("PyErr_Print();");
    w.line(&format!("Py_FatalError(\"can't initialize module {}\");", module));
    w.close_block("");

    // 12. End snippets: target first, then native.
    for snip in ctx
        .ts
        .code_snips
        .iter()
        .filter(|s| s.position == SnipPosition::End && s.language.covers(Language::Target))
    {
        snippets::write_snippet(&mut w, ctx, &env, &snip.code)?;
    }
    for snip in ctx
        .ts
        .code_snips
        .iter()
        .filter(|s| s.position == SnipPosition::End && s.language.covers(Language::Native))
    {
        snippets::write_snippet(&mut w, ctx, &env, &snip.code)?;
    }

    // 13. Teardown hook for QObject modules.
    if ctx.config.enable_pyside_extensions {
        for &enum_id in &ctx.model.global_enums {
            let entity = ctx.model.enum_entity(enum_id);
            if entity.is_anonymous {
                continue;
            }
            let entry = ctx.ts.entry(entity.entry);
            w.line(&format!(
                "qRegisterMetaType< ::{} >(\"{}\");",
                entry.qualified_cpp_name,
                entry.name()
            ));
        }
        w.line("PySide::registerCleanupFunction(cleanTypesAttributes);");
    }

    w.dedent();
    w.line("SBK_MODULE_INIT_FUNCTION_END");
    Ok(w.into_string())
}

/// Class init order: topological, with QMetaObject moved directly
/// before QObject because the meta-object system needs it registered
/// first regardless of what the sort decides.
pub(crate) fn module_class_order(ctx: &EmitCtx) -> Vec<ClassId> {
    let mut order = ctx.model.classes_topological_sorted();
    let qobject = ctx.model.find_class("QObject");
    let qmetaobject = ctx.model.find_class("QMetaObject");
    if let (Some(qobject), Some(qmetaobject)) = (qobject, qmetaobject) {
        order.retain(|&c| c != qmetaobject);
        let pos = order
            .iter()
            .position(|&c| c == qobject)
            .expect("QObject present in sorted classes");
        order.insert(pos, qmetaobject);
    }
    order
}

fn write_extended_conversion_functions(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    source: ClassId,
    external: TypeEntryId,
) {
    let source_class = ctx.model.class(source);
    let source_name = ctx.fixed_type_name_entry(source_class.entry, None);
    let target_name = ctx.fixed_type_name_entry(external, None);
    let target_cpp = format!("::{}", ctx.ts.entry(external).qualified_cpp_name);
    let mut code = CppWriter::new();
    code.line(&format!(
        "*(({0}*)cppOut) = {0}(*{1});",
        target_cpp,
        ctx.wrapper_cpp_pointer(source_class.entry, "pyIn")
    ));
    converters::write_python_to_cpp_function(w, code.as_str(), &source_name, &target_name);
    converters::write_is_convertible_function(
        w,
        &source_name,
        &target_name,
        &format!(
            "PyObject_TypeCheck(pyIn, {})",
            ctx.py_type_object_ext_entry(source_class.entry)
        ),
        false,
    );
    w.blank();
}

fn write_primitive_cpp_to_python(w: &mut CppWriter, ctx: &EmitCtx, entry_id: TypeEntryId) {
    let entry = ctx.ts.entry(entry_id);
    let custom = entry.custom_conversion.as_ref().expect("custom conversion");
    let cpp_name = &entry.qualified_cpp_name;
    let code = format!(
        "{}& cppInRef = *(({}*)cppIn);\n{}",
        cpp_name, cpp_name, custom.native_to_target
    )
    .replace("%INTYPE", cpp_name)
    .replace("%OUTTYPE", "PyObject*")
    .replace("%in", "cppInRef")
    .replace("%out", "pyOut");
    let fixed = ctx.fixed_type_name_entry(entry_id, None);
    converters::write_cpp_to_python_function(w, &code, &fixed, &fixed);
}

fn write_primitive_converter_initialization(w: &mut CppWriter, ctx: &EmitCtx, entry_id: TypeEntryId) {
    let entry = ctx.ts.entry(entry_id);
    let converter = ctx.converter_object_entry(entry_id);
    let fixed = ctx.fixed_type_name_entry(entry_id, None);
    w.line(&format!(
        "// Register converter for type '{}'.",
        entry.target_lang_name
    ));
    let python_type = if entry.target_lang_name == entry.name() {
        "0".to_string()
    } else if entry.target_lang_name == "PyObject" {
        "&PyBaseObject_Type".to_string()
    } else {
        format!("&{}_Type", entry.target_lang_name)
    };
    w.line(&format!(
        "{} = Shiboken::Conversions::createConverter({}, {});",
        converter,
        python_type,
        ctx.cpp_to_python_fn(&fixed, &fixed)
    ));
    w.line(&format!(
        "Shiboken::Conversions::registerConverterName({}, \"{}\");",
        converter, entry.qualified_cpp_name
    ));
    if let Some(custom) = &entry.custom_conversion {
        if !custom.target_to_native.is_empty() {
            w.line("// Add user defined implicit conversions to type converter.");
            for to_native in &custom.target_to_native {
                let source_name = match to_native.source_type {
                    Some(source) => ctx.fixed_type_name_entry(source, None),
                    None => to_native
                        .source_type_name
                        .clone()
                        .unwrap_or_else(|| "PyObject".to_string()),
                };
                converters::write_add_python_to_cpp_conversion(
                    w,
                    &converter,
                    &ctx.python_to_cpp_fn(&source_name, &fixed),
                    &ctx.is_convertible_fn(&source_name, &fixed),
                );
            }
        }
    }
}

fn write_container_converter_initialization(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    container: &AbstractType,
) {
    let signature = container.cpp_signature(ctx.ts);
    w.line(&format!("// Register converter for type '{}'.", signature));
    let converter = ctx.converter_object(container);
    let fixed = ctx.fixed_type_name(container);
    let base_name = ctx.py_base_name_entry(container.entry);
    let python_type = if base_name == "PySequence" {
        "PyList".to_string()
    } else {
        base_name
    };
    w.line(&format!(
        "{} = Shiboken::Conversions::createConverter(&{}_Type, {});",
        converter,
        python_type,
        ctx.cpp_to_python_fn(&fixed, &fixed)
    ));
    w.line(&format!(
        "Shiboken::Conversions::registerConverterName({}, \"{}\");",
        converter, signature
    ));
    converters::write_add_python_to_cpp_conversion(
        w,
        &converter,
        &ctx.python_to_cpp_fn(&fixed, &fixed),
        &ctx.is_convertible_fn(&fixed, &fixed),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_fixtures::ModelBuilder;

    #[test]
    fn header_defines_stable_indices_and_count() {
        let mut b = ModelBuilder::new();
        let point = b.value_class("Point");
        b.constructor(point, &[]);
        let widget = b.object_class("Widget");
        b.constructor(widget, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let header = generate_module_header(&ctx).unwrap();
        assert!(header.contains("#define SBK_POINT_IDX"));
        assert!(header.contains("#define SBK_WIDGET_IDX"));
        assert!(header.contains("SBK_sample_IDX_COUNT"));
        assert!(header.contains("SBK_sample_CONVERTERS_IDX_COUNT"));
        assert!(header.contains("extern PyTypeObject** SbksampleTypes;"));
        assert!(header.contains(
            "template<> inline PyTypeObject* SbkType< ::Point >()"
        ));
    }

    #[test]
    fn indices_are_identical_across_two_runs() {
        let build = || {
            let mut b = ModelBuilder::new();
            let point = b.value_class("Point");
            b.constructor(point, &[]);
            let widget = b.object_class("Widget");
            b.constructor(widget, &[]);
            b.build()
        };
        let (m1, t1, c1, d1) = build();
        let (m2, t2, c2, d2) = build();
        let h1 = generate_module_header(&EmitCtx::new(&m1, &t1, &c1, &d1)).unwrap();
        let h2 = generate_module_header(&EmitCtx::new(&m2, &t2, &c2, &d2)).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn module_unit_initializes_classes_in_dependency_order() {
        let mut b = ModelBuilder::new();
        // Declared derived-first to prove the order comes from the
        // topological sort, not the arena.
        let base_entry_holder = b.object_class("Derived");
        let base = b.object_class("Base");
        b.model.class_mut(base_entry_holder).base_classes.push(base);
        b.constructor(base, &[]);
        b.constructor(base_entry_holder, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let unit = generate_module_unit(&ctx).unwrap();
        let base_pos = unit.find("init_Base(module);").unwrap();
        let derived_pos = unit.find("init_Derived(module);").unwrap();
        assert!(base_pos < derived_pos);
        assert!(unit.contains("SBK_MODULE_INIT_FUNCTION_BEGIN(sample)"));
        assert!(unit.contains("Shiboken::Module::registerTypes(module, SbksampleTypes);"));
        assert!(unit.contains("static PyTypeObject* cppApi[SBK_sample_IDX_COUNT];"));
    }

    #[test]
    fn qmetaobject_is_moved_before_qobject() {
        let mut b = ModelBuilder::new();
        let qobject = b.object_class("QObject");
        b.constructor(qobject, &[]);
        let unrelated = b.object_class("Unrelated");
        b.constructor(unrelated, &[]);
        let qmeta = b.object_class("QMetaObject");
        b.constructor(qmeta, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let order = module_class_order(&ctx);
        let qmeta_pos = order.iter().position(|&c| c == qmeta).unwrap();
        let qobject_pos = order.iter().position(|&c| c == qobject).unwrap();
        assert_eq!(qmeta_pos + 1, qobject_pos);
    }

    #[test]
    fn global_functions_get_method_table() {
        let mut b = ModelBuilder::new();
        let int_ty = b.int_ty();
        b.global_function("answer", &[], Some(int_ty));
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let unit = generate_module_unit(&ctx).unwrap();
        assert!(unit.contains("static PyMethodDef sample_methods[] = {"));
        assert!(unit.contains("\"answer\", (PyCFunction)SbksampleModule_answer, METH_NOARGS"));
    }
}

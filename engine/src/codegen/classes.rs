// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-class emission: the wrapper subclass header, the translation
//! unit with every wrapper function, the Python type object with its
//! slots, multiple-inheritance glue, type discovery, and the class
//! registration routine.

use indexmap::IndexMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use sbkgen_model::{ClassId, FunctionId, Language, SnipPosition};

use super::converters;
use super::enums;
use super::functions::{self, cpp_function_signature};
use super::overloads::OverloadData;
use super::snippets::{self, SnippetEnv};
use super::EmitCtx;
use crate::errors::GenError;
use crate::writer::CppWriter;

/// Number-protocol slot per Python operator name.
static NB_FUNCS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("__add__", "nb_add"),
        ("__sub__", "nb_subtract"),
        ("__mul__", "nb_multiply"),
        ("__div__", "nb_divide"),
        ("__mod__", "nb_remainder"),
        ("__neg__", "nb_negative"),
        ("__pos__", "nb_positive"),
        ("__invert__", "nb_invert"),
        ("__lshift__", "nb_lshift"),
        ("__rshift__", "nb_rshift"),
        ("__and__", "nb_and"),
        ("__xor__", "nb_xor"),
        ("__or__", "nb_or"),
        ("__iadd__", "nb_inplace_add"),
        ("__isub__", "nb_inplace_subtract"),
        ("__imul__", "nb_multiply"),
        ("__idiv__", "nb_divide"),
        ("__imod__", "nb_remainder"),
        ("__ilshift__", "nb_inplace_lshift"),
        ("__irshift__", "nb_inplace_rshift"),
        ("__iand__", "nb_inplace_and"),
        ("__ixor__", "nb_inplace_xor"),
        ("__ior__", "nb_inplace_or"),
    ]
});

/// Sequence-protocol special methods in emission order:
/// name -> (C arguments, C return).
const SEQUENCE_PROTOCOL: &[(&str, (&str, &str))] = &[
    ("__len__", ("PyObject* self", "Py_ssize_t")),
    ("__getitem__", ("PyObject* self, Py_ssize_t _i", "PyObject*")),
    (
        "__setitem__",
        ("PyObject* self, Py_ssize_t _i, PyObject* _value", "int"),
    ),
    (
        "__getslice__",
        ("PyObject* self, Py_ssize_t _i1, Py_ssize_t _i2", "PyObject*"),
    ),
    (
        "__setslice__",
        (
            "PyObject* self, Py_ssize_t _i1, Py_ssize_t _i2, PyObject* _value",
            "int",
        ),
    ),
    ("__contains__", ("PyObject* self, PyObject* _value", "int")),
    ("__concat__", ("PyObject* self, PyObject* _other", "PyObject*")),
];

fn in_protocol(table: &[(&str, (&str, &str))], name: &str) -> bool {
    table.iter().any(|(n, _)| *n == name)
}

const SQ_FUNCS: &[(&str, &str)] = &[
    ("__concat__", "sq_concat"),
    ("__contains__", "sq_contains"),
    ("__getitem__", "sq_item"),
    ("__getslice__", "sq_slice"),
    ("__len__", "sq_length"),
    ("__setitem__", "sq_ass_item"),
    ("__setslice__", "sq_ass_slice"),
];

const MAPPING_PROTOCOL: &[(&str, (&str, &str))] = &[
    ("__mlen__", ("PyObject* self", "Py_ssize_t")),
    ("__mgetitem__", ("PyObject* self, PyObject* _key", "PyObject*")),
    (
        "__msetitem__",
        ("PyObject* self, PyObject* _key, PyObject* _value", "int"),
    ),
];

const MP_FUNCS: &[(&str, &str)] = &[
    ("__mlen__", "mp_length"),
    ("__mgetitem__", "mp_subscript"),
    ("__msetitem__", "mp_ass_subscript"),
];

const TP_FUNCS: &[&str] = &["__str__", "__repr__", "__iter__", "__next__"];

impl<'a> EmitCtx<'a> {
    /// Overload groups of a class, grouped by name in first-seen order.
    pub fn function_groups(&self, class_id: ClassId) -> IndexMap<String, Vec<FunctionId>> {
        let mut groups: IndexMap<String, Vec<FunctionId>> = IndexMap::new();
        for &fid in &self.model.class(class_id).functions {
            let func = self.model.function(fid);
            groups.entry(func.name.clone()).or_default().push(fid);
        }
        groups
    }

    pub fn find_class_function(&self, class_id: ClassId, name: &str) -> Option<FunctionId> {
        self.model
            .class(class_id)
            .functions
            .iter()
            .copied()
            .find(|&f| self.model.function(f).name == name)
    }

    /// The nearest class in the ancestry (self included) with multiple
    /// bases; MI offset glue is generated there and reused below.
    pub fn multiple_inheritance_class(&self, class_id: ClassId) -> Option<ClassId> {
        if self.model.class(class_id).base_classes.len() > 1 {
            return Some(class_id);
        }
        self.model
            .all_ancestors(class_id)
            .into_iter()
            .find(|&a| self.model.class(a).base_classes.len() > 1)
    }

    fn has_comparison_operator(&self, class_id: ClassId) -> bool {
        self.model
            .class(class_id)
            .functions
            .iter()
            .any(|&f| self.model.function(f).is_comparison_operator())
    }

    fn has_bool_cast(&self, class_id: ClassId) -> bool {
        if !self.config.use_isnull_as_nb_nonzero {
            return false;
        }
        self.model
            .class(class_id)
            .functions
            .iter()
            .map(|&f| self.model.function(f))
            .any(|f| {
                f.name == "isNull"
                    && f.flags.is_constant
                    && f.arguments.is_empty()
                    && f.return_type
                        .as_ref()
                        .map(|t| self.ts.entry(t.entry).qualified_cpp_name == "bool")
                        .unwrap_or(false)
            })
    }

    fn supports_number_protocol(&self, class_id: ClassId) -> bool {
        self.has_bool_cast(class_id)
            || self
                .model
                .class(class_id)
                .functions
                .iter()
                .map(|&f| self.model.function(f))
                .any(|f| {
                    (f.is_binary_operator() || f.is_unary_operator() || f.is_inplace_operator())
                        && !f.flags.is_modified_removed
                })
    }

    fn supports_sequence_protocol(&self, class_id: ClassId) -> bool {
        let class = self.model.class(class_id);
        let has_named = class.functions.iter().any(|&f| {
            in_protocol(SEQUENCE_PROTOCOL, &self.model.function(f).name)
        });
        let entry = self.ts.entry(class.entry);
        has_named
            || entry
                .complex_data()
                .map_or(false, |d| d.base_container.is_some())
    }

    fn supports_mapping_protocol(&self, class_id: ClassId) -> bool {
        self.model.class(class_id).functions.iter().any(|&f| {
            in_protocol(MAPPING_PROTOCOL, &self.model.function(f).name)
        })
    }

    fn should_generate_getset_list(&self, class_id: ClassId) -> bool {
        self.model
            .class(class_id)
            .functions
            .iter()
            .map(|&f| self.model.function(f))
            .any(|f| f.flags.is_constructor && !f.flags.is_private)
            && self
                .model
                .class(class_id)
                .fields
                .iter()
                .any(|f| !f.is_static)
    }

    fn has_private_constructors_only(&self, class_id: ClassId) -> bool {
        let ctors: Vec<_> = self
            .model
            .class(class_id)
            .functions
            .iter()
            .map(|&f| self.model.function(f))
            .filter(|f| f.flags.is_constructor)
            .collect();
        !ctors.is_empty() && ctors.iter().all(|f| f.flags.is_private)
    }

    fn class_needs_getattro(&self, class_id: ClassId) -> bool {
        // Mixed static/instance groups need a getattro that rebinds the
        // method without METH_STATIC.
        self.function_groups(class_id)
            .values()
            .any(|group| has_static_and_instance(self, group))
    }

    pub fn class_target_full_name(&self, class_id: ClassId) -> String {
        let class = self.model.class(class_id);
        format!("{}.{}", class.package, class.name)
    }
}

fn has_static_and_instance(ctx: &EmitCtx, group: &[FunctionId]) -> bool {
    group.iter().any(|&f| ctx.model.function(f).flags.is_static)
        && group.iter().any(|&f| !ctx.model.function(f).flags.is_static)
}

/// The overloads Python sees for one group: assignment and cast
/// operators, removed and private functions are not wrapped.
fn visible_overloads(ctx: &EmitCtx, class_id: ClassId, group: &[FunctionId]) -> Vec<FunctionId> {
    group
        .iter()
        .copied()
        .filter(|&fid| {
            let func = ctx.model.function(fid);
            func.operator.as_ref().map_or(true, |op| op.symbol != "=")
                && !func.is_conversion_operator()
                && !func.flags.is_modified_removed
                && !func.flags.is_private
                && func.owner_class == Some(class_id)
                && func.implementing_class == func.owner_class
                && func.name != "qt_metacall"
        })
        .collect()
}

// ---------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------

/// The `<class>_wrapper.h` file: wrapper subclass declaration, or just
/// the include guard when no C++ wrapper is needed.
pub(crate) fn generate_class_header(ctx: &EmitCtx, class_id: ClassId) -> Result<String, GenError> {
    let class = ctx.model.class(class_id);
    let wrapper = ctx.wrapper_name(class);
    let guard = format!("SBK_{}_H", wrapper.replace("::", "_").to_uppercase());
    let mut w = CppWriter::new();

    w.line(&format!("#ifndef {}", guard));
    w.line(&format!("#define {}", guard));
    w.blank();
    if !ctx.config.avoid_protected_hack {
        w.line("#define protected public");
        w.blank();
    }
    w.line("#include <shiboken.h>");
    w.blank();
    if let Some(include) = &ctx.ts.entry(class.entry).include {
        w.line(&include.statement());
    }
    w.blank();

    if ctx.should_generate_cpp_wrapper(class_id) {
        if ctx.config.enable_pyside_extensions && class.is_qobject {
            w.line("namespace PySide { class DynamicQMetaObject; }");
            w.blank();
        }
        w.line(&format!(
            "class {} : public {}",
            wrapper, class.qualified_cpp_name
        ));
        w.line("{");
        w.line("public:");
        w.indent();

        let mut has_virtuals = false;
        let mut inherited_overloads: Vec<FunctionId> = Vec::new();
        for &fid in &class.functions {
            let func = ctx.model.function(fid);
            if func.flags.is_user_added {
                continue;
            }
            if func.flags.is_copy_constructor && !func.flags.is_private {
                w.line(&format!(
                    "{}(const {}& self) : {}(self)",
                    wrapper, class.qualified_cpp_name, class.qualified_cpp_name
                ));
                w.line("{");
                w.line("}");
                w.blank();
                continue;
            }
            if ctx.config.avoid_protected_hack
                && func.flags.is_protected
                && !func.flags.is_constructor
                && !func.is_operator_overload()
            {
                write_protected_thunk(&mut w, ctx, fid);
            }
            if func.flags.is_private
                || (func.flags.is_modified_removed && !func.flags.is_abstract)
            {
                continue;
            }
            if func.flags.is_constructor || func.flags.is_virtual || func.flags.is_abstract {
                let prefix = if func.flags.is_virtual || func.flags.is_abstract {
                    has_virtuals = true;
                    "virtual "
                } else {
                    ""
                };
                let signature = if func.flags.is_constructor {
                    constructor_signature(ctx, fid, &wrapper)
                } else {
                    cpp_function_signature(ctx, func, "")
                };
                w.line(&format!("{}{};", prefix, signature));
                // A virtual override hides any non-virtual base
                // overload with the same name; redeclare them inline.
                for &other in &class.functions {
                    let f = ctx.model.function(other);
                    if other != fid
                        && !f.flags.is_constructor
                        && !f.flags.is_private
                        && !f.flags.is_virtual
                        && !f.flags.is_abstract
                        && !f.flags.is_static
                        && f.name == func.name
                        && !inherited_overloads.contains(&other)
                    {
                        inherited_overloads.push(other);
                    }
                }
            }
        }

        if ctx.config.avoid_protected_hack && class.has_protected_fields() {
            for field in &class.fields {
                if !field.is_protected {
                    continue;
                }
                write_protected_field_accessors(&mut w, ctx, class_id, field);
            }
        }

        if !ctx.config.avoid_protected_hack || !class.has_private_destructor {
            let virtual_kw = if class.has_virtual_destructor || has_virtuals {
                "virtual "
            } else {
                ""
            };
            w.line(&format!("{}~{}();", virtual_kw, wrapper));
        }

        if let Some(data) = ctx.ts.entry(class.entry).complex_data() {
            let env = class_snippet_env(ctx, class_id);
            for snip in data.code_snips.iter().filter(|s| {
                s.position == SnipPosition::Declaration && s.language.covers(Language::Native)
            }) {
                snippets::write_snippet(&mut w, ctx, &env, &snip.code)?;
            }
        }

        if ctx.config.enable_pyside_extensions && class.is_qobject {
            w.dedent();
            w.line("public:");
            w.indent();
            w.line("virtual int qt_metacall(QMetaObject::Call call, int id, void** args);");
            w.line("virtual void* qt_metacast(const char* _clname);");
        }

        if !inherited_overloads.is_empty() {
            w.line("// Inherited overloads, because the using keyword sux");
            for fid in inherited_overloads {
                write_inherited_overload(&mut w, ctx, fid);
            }
        }

        if ctx.config.enable_pyside_extensions {
            w.line("static void pysideInitQtMetaTypes();");
        }

        w.dedent();
        w.line("};");
        w.blank();
    }

    w.line(&format!("#endif // {}", guard));
    w.blank();
    Ok(w.into_string())
}

fn constructor_signature(ctx: &EmitCtx, fid: FunctionId, wrapper: &str) -> String {
    let func = ctx.model.function(fid);
    let args = func
        .arguments
        .iter()
        .map(|a| format!("{} {}", a.ty.cpp_signature(ctx.ts), a.name))
        .join(", ");
    format!("{}({})", wrapper, args)
}

fn write_protected_thunk(w: &mut CppWriter, ctx: &EmitCtx, fid: FunctionId) {
    let func = ctx.model.function(fid);
    let owner = func.owner_class.expect("protected method without owner");
    let class = ctx.model.class(owner);
    let static_kw = if func.flags.is_static { "static " } else { "" };
    let ret = func
        .return_type
        .as_ref()
        .map(|t| t.cpp_signature(ctx.ts))
        .unwrap_or_else(|| "void".to_string());
    let params = func
        .arguments
        .iter()
        .map(|a| format!("{} {}", a.ty.cpp_signature(ctx.ts), a.name))
        .join(", ");
    let args = func.arguments.iter().map(|a| a.name.clone()).join(", ");
    let qualifier = if func.flags.is_abstract {
        String::new()
    } else {
        format!("{}::", class.qualified_cpp_name)
    };
    w.line(&format!(
        "inline {}{} {}_protected({}){} {{ {}{}{}({}); }}",
        static_kw,
        ret,
        func.name,
        params,
        if func.flags.is_constant { " const" } else { "" },
        if func.return_type.is_some() {
            "return "
        } else {
            ""
        },
        qualifier,
        func.name,
        args
    ));
}

fn write_inherited_overload(w: &mut CppWriter, ctx: &EmitCtx, fid: FunctionId) {
    let func = ctx.model.function(fid);
    let owner = func.owner_class.expect("inherited overload without owner");
    let class = ctx.model.class(owner);
    let signature = cpp_function_signature(ctx, func, "");
    let args = func.arguments.iter().map(|a| a.name.clone()).join(", ");
    w.line(&format!(
        "inline {} {{ {}{}::{}({}); }}",
        signature,
        if func.return_type.is_some() {
            "return "
        } else {
            ""
        },
        class.qualified_cpp_name,
        func.name,
        args
    ));
}

fn write_protected_field_accessors(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    class_id: ClassId,
    field: &sbkgen_model::Field,
) {
    let class = ctx.model.class(class_id);
    let field_type = field.ty.cpp_signature(ctx.ts);
    let qualified = format!("{}::{}", class.qualified_cpp_name, field.name);
    let entry = ctx.ts.entry(field.ty.entry);
    // Non-trivial members hand out a pointer into the object.
    let use_reference = !field.ty.is_constant
        && !entry.is_enum()
        && !entry.is_primitive()
        && field.ty.indirections == 0;
    w.line(&format!(
        "inline {}{} protected_{}_getter() {{ return {}this->{}; }}",
        field_type,
        if use_reference { "*" } else { " " },
        field.name,
        if use_reference { "&" } else { " " },
        qualified
    ));
    w.line(&format!(
        "inline void protected_{}_setter({} value) {{ {} = value; }}",
        field.name, field_type, qualified
    ));
}

fn class_snippet_env(ctx: &EmitCtx, class_id: ClassId) -> SnippetEnv {
    let class = ctx.model.class(class_id);
    SnippetEnv {
        class: Some(class_id),
        py_self: "self".to_string(),
        cpp_self: "cppSelf".to_string(),
        cpp_self_accessor: "->".to_string(),
        py_return_var: "pyResult".to_string(),
        type_name: Some(ctx.effective_class_cpp_name(class_id)),
        cpp_type_name: Some(class.name.clone()),
        python_type_object: Some(format!("{}.super.ht_type", ctx.py_type_name(class))),
        context: class.qualified_cpp_name.clone(),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------
// Translation unit
// ---------------------------------------------------------------------

/// The `<class>_wrapper.cpp` file.
pub(crate) fn generate_class_unit(ctx: &EmitCtx, class_id: ClassId) -> Result<String, GenError> {
    let class = ctx.model.class(class_id);
    let entry = ctx.ts.entry(class.entry);
    let base_name = ctx.py_base_name_entry(class.entry);
    let mut w = CppWriter::new();

    if !ctx.config.avoid_protected_hack && !class.is_namespace && !class.has_private_destructor {
        w.line("//workaround to access protected functions");
        w.line("#define protected public");
        w.blank();
    }

    w.line("// default includes");
    w.line("#include <shiboken.h>");
    if ctx.config.enable_pyside_extensions {
        w.line("#include <pysidesignal.h>");
        w.line("#include <pysideproperty.h>");
        w.line("#include <pyside.h>");
    }
    w.line("#include <typeresolver.h>");
    w.line("#include <typeinfo>");
    if ctx.config.enable_pyside_extensions && class.is_qobject {
        w.line("#include <signalmanager.h>");
        w.line("#include <pysidemetafunction.h>");
    }
    if ctx.multiple_inheritance_class(class_id).is_some() {
        w.line("#include <set>");
    }
    w.line(&format!(
        "#include \"{}_python.h\"",
        ctx.ts.module_name.to_lowercase()
    ));
    w.blank();
    w.line(&format!("#include \"{}.h\"", ctx.file_name_for_class(class)));
    for &inner in &class.inner_classes {
        let inner_class = ctx.model.class(inner);
        if ctx.ts.entry(inner_class.entry).generate_wrapper() {
            w.line(&format!(
                "#include \"{}.h\"",
                ctx.file_name_for_class(inner_class)
            ));
        }
    }
    w.blank();
    w.line("// Extra includes");
    let mut extra: Vec<String> = entry
        .extra_includes
        .iter()
        .map(|i| i.statement())
        .collect();
    extra.sort();
    for include in extra {
        w.line(&include);
    }
    w.blank();

    let env = class_snippet_env(ctx, class_id);
    if let Some(data) = entry.complex_data() {
        for snip in data.code_snips.iter().filter(|s| {
            s.position == SnipPosition::Beginning && s.language.covers(Language::Native)
        }) {
            snippets::write_snippet(&mut w, ctx, &env, &snip.code)?;
        }
        w.blank();
    }

    // Native section: the wrapper subclass member definitions.
    if ctx.should_generate_cpp_wrapper(class_id) {
        w.line("// Native ---------------------------------------------------------");
        w.blank();
        for &fid in &class.functions {
            let func = ctx.model.function(fid);
            if func.flags.is_private || (func.flags.is_modified_removed && !func.flags.is_abstract)
            {
                continue;
            }
            if func.flags.is_constructor
                && !func.flags.is_copy_constructor
                && !func.flags.is_user_added
            {
                write_constructor_native(&mut w, ctx, fid)?;
            } else if (!ctx.config.avoid_protected_hack || !class.has_private_destructor)
                && (func.flags.is_virtual || func.flags.is_abstract)
            {
                functions::write_virtual_method_native(&mut w, ctx, fid)?;
            }
        }
        if !ctx.config.avoid_protected_hack || !class.has_private_destructor {
            if ctx.config.enable_pyside_extensions && class.is_qobject {
                write_meta_object_method(&mut w, ctx, class_id);
            }
            write_destructor_native(&mut w, ctx, class_id);
        }
    }

    w.blank();
    w.line("// Target ---------------------------------------------------------");
    w.blank();
    w.line("extern \"C\" {");

    let mut method_defs = CppWriter::new();
    let mut single_method_defs = CppWriter::new();

    for (_, group) in ctx.function_groups(class_id) {
        let overloads = visible_overloads(ctx, class_id, &group);
        if overloads.is_empty() {
            continue;
        }
        let rfunc = ctx.model.function(overloads[0]);
        if in_protocol(SEQUENCE_PROTOCOL, &rfunc.name)
            || in_protocol(MAPPING_PROTOCOL, &rfunc.name)
        {
            continue;
        }
        if rfunc.flags.is_constructor {
            functions::write_constructor_wrapper(&mut w, ctx, &overloads)?;
        } else if rfunc.is_call_operator() {
            functions::write_method_wrapper(&mut w, ctx, &overloads)?;
        } else if !rfunc.is_operator_overload() {
            functions::write_method_wrapper(&mut w, ctx, &overloads)?;
            if has_static_and_instance(ctx, &overloads) {
                single_method_defs.line(&format!(
                    "static PyMethodDef {} = {{",
                    ctx.method_definition_name(rfunc)
                ));
                single_method_defs
                    .indented(|s| s.line(&method_definition_entry(ctx, &overloads)));
                single_method_defs.line("};");
                single_method_defs.blank();
            }
            write_method_definition(&mut method_defs, ctx, &overloads);
        }
    }

    if entry.is_value_type() {
        write_copy_function(&mut w, ctx, class_id);
    }

    w.append(single_method_defs);

    w.line(&format!("static PyMethodDef {}_methods[] = {{", base_name));
    w.append(method_defs);
    if entry.is_value_type() {
        w.line(&format!(
            "    {{\"__copy__\", (PyCFunction){}___copy__, METH_NOARGS}},",
            base_name
        ));
    }
    w.line("    {0} // Sentinel");
    w.line("};");
    w.blank();

    // getattro/setattro
    let is_qobject_root =
        ctx.config.enable_pyside_extensions && class.qualified_cpp_name == "QObject";
    if is_qobject_root {
        write_getattro_function(&mut w, ctx, class_id);
        w.blank();
        write_setattro_function(&mut w, ctx, class_id);
        w.blank();
    } else if ctx.class_needs_getattro(class_id) {
        write_getattro_function(&mut w, ctx, class_id);
        w.blank();
    }

    if ctx.has_bool_cast(class_id) {
        w.line(&format!("static int {}___nb_bool(PyObject* self)", base_name));
        w.line("{");
        w.indent();
        write_cpp_self_for_slot(&mut w, ctx, class_id, "-1");
        w.line("int result;");
        w.begin_allow_threads();
        w.line("result = !cppSelf->isNull();");
        w.end_allow_threads();
        w.line("return result;");
        w.dedent();
        w.assert_gil_balanced();
        w.line("}");
        w.blank();
    }

    // Number-protocol operator wrappers.
    if ctx.supports_number_protocol(class_id) {
        for (_, group) in operator_groups(ctx, class_id, OperatorGroupKind::Number) {
            functions::write_method_wrapper(&mut w, ctx, &group)?;
        }
    }

    if ctx.supports_sequence_protocol(class_id) {
        write_sequence_methods(&mut w, ctx, class_id)?;
    }
    if ctx.supports_mapping_protocol(class_id) {
        write_mapping_methods(&mut w, ctx, class_id)?;
    }

    if ctx.has_comparison_operator(class_id) {
        w.line("// Rich comparison");
        write_rich_compare_function(&mut w, ctx, class_id)?;
    }

    if ctx.should_generate_getset_list(class_id) {
        for field in &class.fields {
            if field.is_static {
                continue;
            }
            write_field_getter(&mut w, ctx, class_id, field);
            if !field.ty.is_constant {
                write_field_setter(&mut w, ctx, class_id, field);
            }
            w.blank();
        }
        w.line(&format!("// Getters and Setters for {}", class.name));
        w.line(&format!(
            "static PyGetSetDef {}[] = {{",
            ctx.getset_list_name(class)
        ));
        for field in &class.fields {
            if field.is_static {
                continue;
            }
            let setter = if field.ty.is_constant {
                "0".to_string()
            } else {
                ctx.field_setter_name(class, &field.name)
            };
            w.line(&format!(
                "    {{const_cast<char*>(\"{}\"), {}, {}}},",
                field.name,
                ctx.field_getter_name(class, &field.name),
                setter
            ));
        }
        w.line("    {0}  // Sentinel");
        w.line("};");
        w.blank();
    }

    w.line("} // extern \"C\"");
    w.blank();

    if let Some(data) = entry.complex_data() {
        if data.hash_function.is_some() {
            write_hash_function(&mut w, ctx, class_id);
        }
    }

    write_tp_traverse_and_clear(&mut w, ctx, class_id);
    write_class_definition(&mut w, ctx, class_id)?;
    w.blank();

    if class.is_polymorphic && !class.base_classes.is_empty() {
        write_type_discovery_function(&mut w, ctx, class_id);
    }

    for &enum_id in &class.enums {
        let entity = ctx.model.enum_entity(enum_id);
        if entity.is_anonymous {
            continue;
        }
        enums::write_flags_methods(&mut w, ctx, enum_id);
        enums::write_flags_number_methods_definition(&mut w, ctx, enum_id);
    }
    w.blank();

    for &enum_id in &class.enums {
        enums::write_enum_converter_functions(&mut w, ctx, enum_id)?;
    }
    converters::write_class_converter_functions(&mut w, ctx, class_id)?;
    write_class_register(&mut w, ctx, class_id)?;

    if let Some(data) = entry.complex_data() {
        for snip in data
            .code_snips
            .iter()
            .filter(|s| s.position == SnipPosition::End && s.language.covers(Language::Native))
        {
            snippets::write_snippet(&mut w, ctx, &env, &snip.code)?;
        }
    }

    Ok(w.into_string())
}

enum OperatorGroupKind {
    Number,
    Comparison,
}

/// Operator overload groups of a class by Python name.
fn operator_groups(
    ctx: &EmitCtx,
    class_id: ClassId,
    kind: OperatorGroupKind,
) -> IndexMap<String, Vec<FunctionId>> {
    let mut groups: IndexMap<String, Vec<FunctionId>> = IndexMap::new();
    for &fid in &ctx.model.class(class_id).functions {
        let func = ctx.model.function(fid);
        let wanted = match kind {
            OperatorGroupKind::Number => {
                func.is_binary_operator() || func.is_unary_operator() || func.is_inplace_operator()
            }
            OperatorGroupKind::Comparison => func.is_comparison_operator(),
        };
        if !wanted || func.flags.is_modified_removed || func.flags.is_private {
            continue;
        }
        groups
            .entry(ctx.python_operator_function_name(func))
            .or_default()
            .push(fid);
    }
    groups
}

fn method_definition_entry(ctx: &EmitCtx, overloads: &[FunctionId]) -> String {
    let data = OverloadData::new(ctx, overloads);
    let func = ctx.model.function(data.reference_function());
    let use_py_args = data.uses_py_args(ctx);
    let mut flags = if data.min_args == data.max_args && data.max_args < 2 && !use_py_args {
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
    if func.owner_class.is_some() && data.has_static_function(ctx) {
        flags.push_str("|METH_STATIC");
    }
    format!(
        "\"{}\", (PyCFunction){}, {}",
        func.name,
        ctx.cpython_function_name(func),
        flags
    )
}

fn write_method_definition(w: &mut CppWriter, ctx: &EmitCtx, overloads: &[FunctionId]) {
    let func = ctx.model.function(overloads[0]);
    if TP_FUNCS.contains(&func.name.as_str()) {
        return;
    }
    if has_static_and_instance(ctx, overloads) {
        w.line(&format!("    {},", ctx.method_definition_name(func)));
    } else {
        w.line(&format!("    {{{}}},", method_definition_entry(ctx, overloads)));
    }
}

fn write_constructor_native(w: &mut CppWriter, ctx: &EmitCtx, fid: FunctionId) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    let owner = func.owner_class.expect("constructor without owner");
    let class = ctx.model.class(owner);
    let wrapper = ctx.wrapper_name(class);
    let params = func
        .arguments
        .iter()
        .map(|a| format!("{} {}", a.ty.cpp_signature(ctx.ts), a.name))
        .join(", ");
    let args = func.arguments.iter().map(|a| a.name.clone()).join(", ");
    w.line(&format!(
        "{}::{}({}) : {}({}) {{",
        wrapper, wrapper, params, class.qualified_cpp_name, args
    ));
    w.indent();
    let data = OverloadData::new(ctx, &[fid]);
    let env = functions::build_snippet_env(ctx, fid, &data, Language::Native, None, "");
    for snip in func
        .modifications
        .snips(SnipPosition::Beginning, Language::Native)
    {
        snippets::write_snippet(w, ctx, &env, &snip.code)?;
    }
    w.line("// ... middle");
    for snip in func.modifications.snips(SnipPosition::End, Language::Native) {
        snippets::write_snippet(w, ctx, &env, &snip.code)?;
    }
    w.dedent();
    w.line("}");
    w.blank();
    Ok(())
}

fn write_destructor_native(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let wrapper = ctx.wrapper_name(ctx.model.class(class_id));
    w.line(&format!("{}::~{}()", wrapper, wrapper));
    w.line("{");
    w.indent();
    w.line("SbkObject* wrapper = Shiboken::BindingManager::instance().retrieveWrapper(this);");
    w.line("Shiboken::Object::destroy(wrapper, this);");
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_meta_object_method(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    let wrapper = ctx.wrapper_name(class);
    w.line(&format!(
        "int {}::qt_metacall(QMetaObject::Call call, int id, void** args)",
        wrapper
    ));
    w.line("{");
    w.indent();
    w.line(&format!(
        "int result = {}::qt_metacall(call, id, args);",
        class.qualified_cpp_name
    ));
    w.line("return result < 0 ? result : PySide::SignalManager::qt_metacall(this, call, result, args);");
    w.dedent();
    w.line("}");
    w.blank();
    w.line(&format!("void* {}::qt_metacast(const char* _clname)", wrapper));
    w.line("{");
    w.indent();
    w.line("if (!_clname) return 0;");
    w.line(&format!(
        "SbkObject* pySelf = Shiboken::BindingManager::instance().retrieveWrapper(this);"
    ));
    w.line("if (pySelf && PySide::inherits(Py_TYPE(pySelf), _clname))");
    w.indented(|w| w.line("return static_cast<void*>(const_cast< SbkObject* >(pySelf));"));
    w.line(&format!(
        "return {}::qt_metacast(_clname);",
        class.qualified_cpp_name
    ));
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_cpp_self_for_slot(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId, ec: &str) {
    let class = ctx.model.class(class_id);
    w.line(&format!("::{}* cppSelf = 0;", class.qualified_cpp_name));
    w.line("if (!Shiboken::Object::isValid(self))");
    w.indented(|x| x.line(&format!("return {};", ec)));
    w.line(&format!(
        "cppSelf = {};",
        ctx.wrapper_cpp_pointer(class.entry, "self")
    ));
}

fn write_copy_function(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    let base_name = ctx.py_base_name_entry(class.entry);
    w.line(&format!("static PyObject* {}___copy__(PyObject* self)", base_name));
    w.line("{");
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "0");
    let value_type = sbkgen_model::AbstractType::plain(class.entry);
    w.line(&format!(
        "PyObject* pyResult = {};",
        ctx.to_python_conversion(&value_type, "*cppSelf")
    ));
    w.open_block("if (PyErr_Occurred() || !pyResult)");
    w.line("Py_XDECREF(pyResult);");
    w.line("return 0;");
    w.close_block("");
    w.line("return pyResult;");
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_field_getter(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    class_id: ClassId,
    field: &sbkgen_model::Field,
) {
    let class = ctx.model.class(class_id);
    w.line(&format!(
        "static PyObject* {}(PyObject* self, void*)",
        ctx.field_getter_name(class, &field.name)
    ));
    w.line("{");
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "0");

    // Wrapper members hand the internal object out without copying, so
    // the returned wrapper must be parented to self.
    let new_wrapper_same_object = !field.ty.is_constant
        && ctx.is_wrapper_type(&field.ty)
        && !field.ty.is_pointer();
    let mut cpp_field = format!("cppSelf->{}", field.name);
    if new_wrapper_same_object {
        cpp_field = format!("&({})", cpp_field);
    }
    if ctx.is_cpp_integral_primitive(&field.ty) || ctx.ts.entry(field.ty.entry).is_enum() {
        w.line(&format!(
            "{} cppOut_local = {};",
            ctx.full_type_name_without_modifiers(&field.ty),
            cpp_field
        ));
        cpp_field = "cppOut_local".to_string();
    }
    if new_wrapper_same_object {
        w.line(&format!(
            "PyObject* pyOut = Shiboken::Object::newObject((SbkObjectType*){}, {}, false, true);",
            ctx.py_type_object_ext(&field.ty),
            cpp_field
        ));
        w.line("Shiboken::Object::setParent(self, pyOut);");
    } else {
        w.line(&format!(
            "PyObject* pyOut = {};",
            ctx.to_python_conversion(&field.ty, &cpp_field)
        ));
    }
    w.line("return pyOut;");
    w.dedent();
    w.line("}");
}

fn write_field_setter(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    class_id: ClassId,
    field: &sbkgen_model::Field,
) {
    let class = ctx.model.class(class_id);
    w.line(&format!(
        "static int {}(PyObject* self, PyObject* pyIn, void*)",
        ctx.field_setter_name(class, &field.name)
    ));
    w.line("{");
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "-1");
    w.open_block("if (pyIn == 0)");
    w.line(&format!(
        "PyErr_SetString(PyExc_TypeError, \"'{}' may not be deleted\");",
        field.name
    ));
    w.line("return -1;");
    w.close_block("");

    w.line("PythonToCppFunc pythonToCpp;");
    let check = format!(
        "(pythonToCpp = {}(pyIn)))",
        ctx.is_convertible_function(&field.ty)
    );
    w.open_block(&format!("if (!{})", check));
    w.line(&format!(
        "PyErr_SetString(PyExc_TypeError, \"wrong type attributed to '{}', '{}' or convertible type expected\");",
        field.name,
        ctx.ts.entry(field.ty.entry).name()
    ));
    w.line("return -1;");
    w.close_block("");
    w.blank();

    let cpp_field = format!("cppSelf->{}", field.name);
    let entry = ctx.ts.entry(field.ty.entry);
    if ctx.is_cpp_integral_primitive(&field.ty) || entry.is_enum() || entry.is_flags() {
        w.line(&format!(
            "{} cppOut_local = {};",
            ctx.full_type_name_without_modifiers(&field.ty),
            cpp_field
        ));
        w.line("pythonToCpp(pyIn, &cppOut_local);");
        w.line(&format!("{} = cppOut_local;", cpp_field));
    } else {
        w.line(&format!(
            "{}{}& cppOut_ptr = {};",
            ctx.full_type_name_without_modifiers(&field.ty),
            "*".repeat(field.ty.indirections as usize),
            cpp_field
        ));
        w.line("pythonToCpp(pyIn, &cppOut_ptr);");
    }
    w.blank();
    if ctx.is_pointer_to_wrapper(&field.ty) {
        w.line(&format!(
            "Shiboken::Object::keepReference(reinterpret_cast<SbkObject*>(self), \"{}\", pyIn);",
            field.name
        ));
    }
    w.line("return 0;");
    w.dedent();
    w.line("}");
}

fn write_hash_function(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    let hash_fn = ctx
        .ts
        .entry(class.entry)
        .complex_data()
        .and_then(|d| d.hash_function.clone())
        .expect("hash function declared");
    w.line(&format!(
        "static Py_hash_t {}_HashFunc(PyObject* self) {{",
        ctx.py_base_name_entry(class.entry)
    ));
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "-1");
    let deref = if ctx.ts.entry(class.entry).is_object_type() {
        ""
    } else {
        "*"
    };
    w.line(&format!("return {}({}cppSelf);", hash_fn, deref));
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_tp_traverse_and_clear(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let base_name = ctx.py_base_name_entry(ctx.model.class(class_id).entry);
    w.line(&format!(
        "static int {}_traverse(PyObject* self, visitproc visit, void* arg)",
        base_name
    ));
    w.line("{");
    w.indented(|x| {
        x.line("return reinterpret_cast<PyTypeObject*>(&SbkObject_Type)->tp_traverse(self, visit, arg);")
    });
    w.line("}");
    w.line(&format!("static int {}_clear(PyObject* self)", base_name));
    w.line("{");
    w.indented(|x| {
        x.line("return reinterpret_cast<PyTypeObject*>(&SbkObject_Type)->tp_clear(self);")
    });
    w.line("}");
}

fn write_getattro_function(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    w.line(&format!(
        "static PyObject* {}(PyObject* self, PyObject* name)",
        ctx.getattro_name(class)
    ));
    w.line("{");
    w.indent();
    let getattr_expr = if ctx.config.enable_pyside_extensions && class.is_qobject {
        format!(
            "PySide::getMetaDataFromQObject({}, self, name)",
            ctx.wrapper_cpp_pointer(class.entry, "self")
        )
    } else {
        "PyObject_GenericGetAttr(self, name)".to_string()
    };

    if ctx.class_needs_getattro(class_id) {
        w.open_block("if (self)");
        w.line("// Search the method in the instance dict");
        w.open_block("if (reinterpret_cast<SbkObject*>(self)->ob_dict)");
        w.line("PyObject* meth = PyDict_GetItem(reinterpret_cast<SbkObject*>(self)->ob_dict, name);");
        w.open_block("if (meth)");
        w.line("Py_INCREF(meth);");
        w.line("return meth;");
        w.close_block("");
        w.close_block("");
        w.line("// Search the method in the type dict");
        w.open_block("if (Shiboken::Object::isUserType(self))");
        w.line("PyObject* meth = PyDict_GetItem(self->ob_type->tp_dict, name);");
        w.line("if (meth)");
        w.indented(|x| {
            x.line(&format!(
                "return PyFunction_Check(meth) ? SBK_PyMethod_New(meth, self) : {};",
                getattr_expr
            ))
        });
        w.close_block("");
        for (_, group) in ctx.function_groups(class_id) {
            if !has_static_and_instance(ctx, &group) {
                continue;
            }
            let func = ctx.model.function(group[0]);
            let def_name = ctx.method_definition_name(func);
            w.line(&format!("static PyMethodDef non_static_{} = {{", def_name));
            w.indented(|x| {
                x.line(&format!("{}.ml_name,", def_name));
                x.line(&format!("{}.ml_meth,", def_name));
                x.line(&format!("{}.ml_flags & (~METH_STATIC),", def_name));
                x.line(&format!("{}.ml_doc,", def_name));
            });
            w.line("};");
            w.line(&format!(
                "if (Shiboken::String::compare(name, \"{}\") == 0)",
                func.name
            ));
            w.indented(|x| {
                x.line(&format!(
                    "return PyCFunction_NewEx(&non_static_{}, self, 0);",
                    def_name
                ))
            });
        }
        w.close_block("");
    }
    w.line(&format!("return {};", getattr_expr));
    w.dedent();
    w.line("}");
}

fn write_setattro_function(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    w.line(&format!(
        "static int {}(PyObject* self, PyObject* name, PyObject* value)",
        ctx.setattro_name(class)
    ));
    w.line("{");
    w.indent();
    if ctx.config.enable_pyside_extensions {
        w.line("Shiboken::AutoDecRef pp(reinterpret_cast<PyObject*>(PySide::Property::getObject(self, name)));");
        w.line("if (!pp.isNull())");
        w.indented(|x| {
            x.line("return PySide::Property::setValue(reinterpret_cast<PySideProperty*>(pp.object()), self, value);")
        });
    }
    w.line("return PyObject_GenericSetAttr(self, name, value);");
    w.dedent();
    w.line("}");
}

fn write_sequence_methods(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) -> Result<(), GenError> {
    let mut wrote_any = false;
    for (name, (args, ret)) in SEQUENCE_PROTOCOL.iter() {
        let Some(fid) = ctx.find_class_function(class_id, name) else {
            continue;
        };
        wrote_any = true;
        write_protocol_method(w, ctx, fid, args, ret)?;
    }
    if !wrote_any {
        write_std_list_wrapper_methods(w, ctx, class_id);
    }
    Ok(())
}

fn write_mapping_methods(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) -> Result<(), GenError> {
    for (name, (args, ret)) in MAPPING_PROTOCOL.iter() {
        let Some(fid) = ctx.find_class_function(class_id, name) else {
            continue;
        };
        write_protocol_method(w, ctx, fid, args, ret)?;
    }
    Ok(())
}

/// Protocol methods carry their whole body as injected code.
fn write_protocol_method(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    fid: FunctionId,
    args: &str,
    ret: &str,
) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    let ec = if ret == "PyObject*" { "0" } else { "-1" };
    w.line(&format!(
        "{} {}({})",
        ret,
        ctx.cpython_function_name(func),
        args
    ));
    w.line("{");
    w.indent();
    w.line("if (!Shiboken::Object::isValid(self))");
    w.indented(|x| x.line(&format!("return {};", ec)));
    if let Some(owner) = func.owner_class {
        write_cpp_self_for_slot(w, ctx, owner, ec);
    }
    let data = OverloadData::new(ctx, &[fid]);
    let env = functions::build_snippet_env(ctx, fid, &data, Language::Target, None, ec);
    for snip in func.modifications.snips(SnipPosition::Any, Language::Target) {
        snippets::write_snippet(w, ctx, &env, &snip.code)?;
    }
    w.dedent();
    w.line("}");
    w.blank();
    Ok(())
}

/// Generic iterator-based sequence protocol for classes deriving from a
/// container instantiation.
fn write_std_list_wrapper_methods(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    let base_name = ctx.py_base_name_entry(class.entry);

    w.line(&format!("Py_ssize_t {}__len__(PyObject* self)", base_name));
    w.line("{");
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "0");
    w.line("return cppSelf->size();");
    w.dedent();
    w.line("}");
    w.blank();

    w.line(&format!(
        "PyObject* {}__getitem__(PyObject* self, Py_ssize_t _i)",
        base_name
    ));
    w.line("{");
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "0");
    w.open_block("if (_i < 0 || _i >= (Py_ssize_t) cppSelf->size())");
    w.line("PyErr_SetString(PyExc_IndexError, \"index out of bounds\");");
    w.line("return 0;");
    w.close_block("");
    w.line(&format!(
        "::{}::iterator _item = cppSelf->begin();",
        class.qualified_cpp_name
    ));
    w.line("for (Py_ssize_t pos = 0; pos < _i; pos++) _item++;");
    let element_type = container_element_type(ctx, class_id);
    match element_type {
        Some(element) => {
            w.line(&format!(
                "return {};",
                ctx.to_python_conversion(&element, "*_item")
            ));
        }
        None => {
            w.line("#error Cannot deduce the element type of this container class");
            w.line("return 0;");
        }
    }
    w.dedent();
    w.line("}");
    w.blank();

    w.line(&format!(
        "int {}__setitem__(PyObject* self, Py_ssize_t _i, PyObject* pyArg)",
        base_name
    ));
    w.line("{");
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "-1");
    w.open_block("if (_i < 0 || _i >= (Py_ssize_t) cppSelf->size())");
    w.line("PyErr_SetString(PyExc_IndexError, \"list assignment index out of range\");");
    w.line("return -1;");
    w.close_block("");
    let element_type = container_element_type(ctx, class_id);
    match element_type {
        Some(element) => {
            w.line("PythonToCppFunc pythonToCpp;");
            w.open_block(&format!(
                "if (!(pythonToCpp = {}(pyArg))))",
                ctx.is_convertible_function(&element)
            ));
            w.line("PyErr_SetString(PyExc_TypeError, \"attributed value with wrong type\");");
            w.line("return -1;");
            w.close_block("");
            w.line(&format!(
                "{} cppValue{};",
                ctx.full_type_name(&element),
                ctx.minimal_constructor(&element)
                    .map(|c| format!(" = {}", c))
                    .unwrap_or_default()
            ));
            w.line("pythonToCpp(pyArg, &cppValue);");
            w.line(&format!(
                "::{}::iterator _item = cppSelf->begin();",
                class.qualified_cpp_name
            ));
            w.line("for (Py_ssize_t pos = 0; pos < _i; pos++) _item++;");
            w.line("*_item = cppValue;");
        }
        None => {
            w.line("#error Cannot deduce the element type of this container class");
        }
    }
    w.line("return 0;");
    w.dedent();
    w.line("}");
    w.blank();
}

/// The element type of a container-typedef class, if any.
fn container_element_type(
    ctx: &EmitCtx,
    class_id: ClassId,
) -> Option<sbkgen_model::AbstractType> {
    let class = ctx.model.class(class_id);
    let _ = ctx
        .ts
        .entry(class.entry)
        .complex_data()
        .and_then(|d| d.base_container)?;
    // The first function argument or return mentioning the element
    // carries the instantiation in practice; fall back to int.
    for &fid in &class.functions {
        let func = ctx.model.function(fid);
        for arg in &func.arguments {
            if ctx.ts.entry(arg.ty.entry).is_container() && !arg.ty.instantiations.is_empty() {
                return Some(arg.ty.instantiations[0].clone());
            }
        }
    }
    None
}

fn write_rich_compare_function(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    class_id: ClassId,
) -> Result<(), GenError> {
    let class = ctx.model.class(class_id);
    let base_name = ctx.py_base_name_entry(class.entry);
    w.line(&format!(
        "static PyObject* {}_richcompare(PyObject* self, PyObject* pyArg, int op)",
        base_name
    ));
    w.line("{");
    w.indent();
    // Comparison always works on a reference to the C++ value.
    w.line(&format!(
        "::{0}& cppSelf = *({1});",
        class.qualified_cpp_name,
        ctx.wrapper_cpp_pointer(class.entry, "self")
    ));
    w.line("PyObject* pyResult = 0;");
    w.line("PythonToCppFunc pythonToCpp;");
    w.blank();

    w.open_block("switch (op)");
    for (_, group) in operator_groups(ctx, class_id, OperatorGroupKind::Comparison) {
        let rfunc = ctx.model.function(group[0]);
        let operator_id = ctx.python_rich_compare_id(rfunc);
        w.line(&format!("case {}:", operator_id));
        w.indent();

        let data = OverloadData::new(ctx, &group);
        let mut first = true;
        for child in &data.root.children {
            let fid = child.overloads[0];
            let func = ctx.model.function(fid);
            if func.flags.is_static {
                continue;
            }
            let Some(arg_type) = child.arg_type.as_ref() else {
                continue;
            };
            let check = format!(
                "(pythonToCpp = {}(pyArg)))",
                ctx.is_convertible_function(arg_type)
            );
            if first {
                w.open_block(&format!("if ({})", check));
                first = false;
            } else {
                w.dedent();
                w.line(&format!("}} else if ({}) {{", check));
                w.indent();
            }
            w.line(&format!("// {}", func.minimal_signature));
            functions_arg_conversion_for_compare(w, ctx, arg_type);
            let op = &rfunc.operator.as_ref().expect("comparison operator").symbol;
            let deref = if ctx.should_dereference_when_passing(arg_type) {
                "*"
            } else {
                ""
            };
            match &func.return_type {
                Some(ret) => {
                    w.line(&format!(
                        "{} cppResult = cppSelf {} ({}cppArg0);",
                        ret.cpp_signature(ctx.ts),
                        op,
                        deref
                    ));
                    w.line(&format!(
                        "pyResult = {};",
                        ctx.to_python_conversion(ret, "cppResult")
                    ));
                }
                None => {
                    w.line(&format!("cppSelf {} ({}cppArg0);", op, deref));
                    w.line("pyResult = Py_None;");
                    w.line("Py_INCREF(Py_None);");
                }
            }
        }
        if !first {
            w.dedent();
            w.line("} else {");
            w.indent();
        }
        if operator_id == "Py_EQ" || operator_id == "Py_NE" {
            w.line(&format!(
                "pyResult = {};",
                if operator_id == "Py_EQ" {
                    "Py_False"
                } else {
                    "Py_True"
                }
            ));
            w.line("Py_INCREF(pyResult);");
        } else {
            w.line(&format!("goto {}_RichComparison_TypeError;", base_name));
        }
        if !first {
            w.close_block("");
        }
        w.blank();
        w.line("break;");
        w.dedent();
    }
    w.line("default:");
    w.indented(|x| x.line(&format!("goto {}_RichComparison_TypeError;", base_name)));
    w.close_block("");
    w.blank();

    w.line("if (pyResult && !PyErr_Occurred())");
    w.indented(|x| x.line("return pyResult;"));
    w.line(&format!("{}_RichComparison_TypeError:", base_name));
    w.line("PyErr_SetString(PyExc_NotImplementedError, \"operator not implemented.\");");
    w.line("return 0;");
    w.dedent();
    w.line("}");
    w.blank();
    Ok(())
}

fn functions_arg_conversion_for_compare(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    arg_type: &sbkgen_model::AbstractType,
) {
    let entry = ctx.ts.entry(arg_type.entry);
    let treat_as_pointer = ctx.is_value_type_with_copy_ctor_only(arg_type.entry);
    let pointer_semantics =
        (entry.is_object_type() || arg_type.is_pointer() || treat_as_pointer) && !entry.is_primitive();
    if pointer_semantics {
        w.line(&format!(
            "{}* cppArg0;",
            ctx.full_type_name_without_modifiers(arg_type)
        ));
        w.line("pythonToCpp(pyArg, &cppArg0);");
    } else if arg_type.is_reference && entry.is_complex() {
        let init = ctx
            .minimal_constructor(arg_type)
            .map(|c| format!(" = {}", c))
            .unwrap_or_default();
        w.line(&format!(
            "{} cppArg0_local{};",
            ctx.full_type_name_without_modifiers(arg_type),
            init
        ));
        w.line(&format!(
            "{}* cppArg0 = &cppArg0_local;",
            ctx.full_type_name_without_modifiers(arg_type)
        ));
        w.line("pythonToCpp(pyArg, &cppArg0_local);");
    } else {
        let init = ctx
            .minimal_constructor(arg_type)
            .map(|c| format!(" = {}", c))
            .unwrap_or_default();
        w.line(&format!(
            "{} cppArg0{};",
            ctx.full_type_name_without_modifiers(arg_type),
            init
        ));
        w.line("pythonToCpp(pyArg, &cppArg0);");
    }
}

fn write_class_definition(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) -> Result<(), GenError> {
    let class = ctx.model.class(class_id);
    let entry = ctx.ts.entry(class.entry);
    let base_name = ctx.py_base_name_entry(class.entry);

    let ctors: Vec<FunctionId> = class
        .functions
        .iter()
        .copied()
        .filter(|&f| {
            let func = ctx.model.function(f);
            func.flags.is_constructor && !func.flags.is_private && !func.flags.is_modified_removed
        })
        .collect();
    let only_private_ctor = ctx.has_private_constructors_only(class_id);

    let (tp_flags, tp_dealloc, tp_init): (String, String, String) =
        if class.is_namespace || class.has_private_destructor {
            (
                "Py_TPFLAGS_DEFAULT|Py_TPFLAGS_CHECKTYPES|Py_TPFLAGS_HAVE_GC".to_string(),
                if class.has_private_destructor {
                    "SbkDeallocWrapperWithPrivateDtor".to_string()
                } else {
                    "0".to_string()
                },
                "0".to_string(),
            )
        } else {
            let flags = if only_private_ctor {
                "Py_TPFLAGS_DEFAULT|Py_TPFLAGS_CHECKTYPES|Py_TPFLAGS_HAVE_GC"
            } else {
                "Py_TPFLAGS_DEFAULT|Py_TPFLAGS_BASETYPE|Py_TPFLAGS_CHECKTYPES|Py_TPFLAGS_HAVE_GC"
            };
            let init = if only_private_ctor || ctors.is_empty() {
                "0".to_string()
            } else {
                ctx.cpython_function_name(ctx.model.function(ctors[0]))
            };
            (flags.to_string(), "&SbkDeallocWrapper".to_string(), init)
        };

    let is_qobject_root =
        ctx.config.enable_pyside_extensions && class.qualified_cpp_name == "QObject";
    let tp_getattro = if is_qobject_root || ctx.class_needs_getattro(class_id) {
        ctx.getattro_name(class)
    } else {
        "0".to_string()
    };
    let tp_setattro = if is_qobject_root {
        ctx.setattro_name(class)
    } else {
        "0".to_string()
    };

    let tp_new = if class.has_private_destructor || only_private_ctor {
        "0"
    } else {
        "SbkObjectTpNew"
    };

    let tp_richcompare = if ctx.has_comparison_operator(class_id) {
        format!("{}_richcompare", base_name)
    } else {
        "0".to_string()
    };
    let tp_getset = if ctx.should_generate_getset_list(class_id) {
        ctx.getset_list_name(class)
    } else {
        "0".to_string()
    };
    let tp_hash = if entry
        .complex_data()
        .map_or(false, |d| d.hash_function.is_some())
    {
        format!("&{}_HashFunc", base_name)
    } else {
        "0".to_string()
    };
    let tp_call = match ctx.find_class_function(class_id, "operator()") {
        Some(fid) if !ctx.model.function(fid).flags.is_modified_removed => {
            format!("&{}", ctx.cpython_function_name(ctx.model.function(fid)))
        }
        _ => "0".to_string(),
    };

    // Special-named methods take their slots.
    let mut tp_funcs: HashMap<&str, String> = TP_FUNCS
        .iter()
        .map(|&name| (name, "0".to_string()))
        .collect();
    for &fid in &class.functions {
        let func = ctx.model.function(fid);
        if tp_funcs.contains_key(func.name.as_str()) {
            tp_funcs.insert(
                TP_FUNCS
                    .iter()
                    .find(|&&n| n == func.name)
                    .expect("known tp func"),
                ctx.cpython_function_name(func),
            );
        }
    }
    if tp_funcs["__repr__"] == "0"
        && !class.is_qobject
        && entry
            .complex_data()
            .map_or(false, |d| d.to_string_capability)
    {
        tp_funcs.insert("__repr__", write_repr_function(w, ctx, class_id));
    }

    // Multiple-inheritance glue comes right before the type struct.
    if let Some(mi_class) = ctx.multiple_inheritance_class(class_id) {
        if mi_class == class_id {
            write_multiple_inheritance_initializer(w, ctx, class_id);
        }
        write_special_cast_function(w, ctx, class_id);
        w.blank();
    }

    let base_class_ref = if class.base_classes.is_empty() {
        "reinterpret_cast<PyTypeObject*>(&SbkObject_Type)"
    } else {
        "0"
    };

    w.line("// Class Definition -----------------------------------------------");
    w.line("extern \"C\" {");

    if ctx.supports_number_protocol(class_id) {
        w.line(&format!("static PyNumberMethods {}_TypeAsNumber;", base_name));
        w.blank();
    }
    if ctx.supports_sequence_protocol(class_id) {
        w.line(&format!(
            "static PySequenceMethods {}_TypeAsSequence;",
            base_name
        ));
        w.blank();
    }
    if ctx.supports_mapping_protocol(class_id) {
        w.line(&format!(
            "static PyMappingMethods {}_TypeAsMapping;",
            base_name
        ));
        w.blank();
    }

    w.line(&format!("static SbkObjectType {}_Type = {{ {{ {{", base_name));
    w.indent();
    w.line("PyVarObject_HEAD_INIT(&SbkObjectType_Type, 0)");
    let slots = [
        ("tp_name", format!("\"{}\"", ctx.class_target_full_name(class_id))),
        ("tp_basicsize", "sizeof(SbkObject)".to_string()),
        ("tp_itemsize", "0".to_string()),
        ("tp_dealloc", tp_dealloc),
        ("tp_print", "0".to_string()),
        ("tp_getattr", "0".to_string()),
        ("tp_setattr", "0".to_string()),
        ("tp_compare", "0".to_string()),
        ("tp_repr", tp_funcs["__repr__"].clone()),
        ("tp_as_number", "0".to_string()),
        ("tp_as_sequence", "0".to_string()),
        ("tp_as_mapping", "0".to_string()),
        ("tp_hash", tp_hash),
        ("tp_call", tp_call),
        ("tp_str", tp_funcs["__str__"].clone()),
        ("tp_getattro", tp_getattro),
        ("tp_setattro", tp_setattro),
        ("tp_as_buffer", "0".to_string()),
        ("tp_flags", tp_flags),
        ("tp_doc", "0".to_string()),
        ("tp_traverse", format!("{}_traverse", base_name)),
        ("tp_clear", format!("{}_clear", base_name)),
        ("tp_richcompare", tp_richcompare),
        ("tp_weaklistoffset", "0".to_string()),
        ("tp_iter", tp_funcs["__iter__"].clone()),
        ("tp_iternext", tp_funcs["__next__"].clone()),
        ("tp_methods", format!("{}_methods", base_name)),
        ("tp_members", "0".to_string()),
        ("tp_getset", tp_getset),
        ("tp_base", base_class_ref.to_string()),
        ("tp_dict", "0".to_string()),
        ("tp_descr_get", "0".to_string()),
        ("tp_descr_set", "0".to_string()),
        ("tp_dictoffset", "0".to_string()),
        ("tp_init", tp_init),
        ("tp_alloc", "0".to_string()),
        ("tp_new", tp_new.to_string()),
        ("tp_free", "0".to_string()),
        ("tp_is_gc", "0".to_string()),
        ("tp_bases", "0".to_string()),
        ("tp_mro", "0".to_string()),
        ("tp_cache", "0".to_string()),
        ("tp_subclasses", "0".to_string()),
        ("tp_weaklist", "0".to_string()),
    ];
    for (i, (name, value)) in slots.iter().enumerate() {
        let comma = if i + 1 == slots.len() { "" } else { "," };
        w.line(&format!("/*{:<20}*/ {}{}", name, value, comma));
    }
    w.dedent();
    w.line("}, },");
    w.line("    /*priv_data*/           0");
    w.line("};");
    w.line("} //extern");
    Ok(())
}

fn write_repr_function(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) -> String {
    let class = ctx.model.class(class_id);
    let func_name = format!("{}__repr__", ctx.py_base_name_entry(class.entry));
    w.line("extern \"C\"");
    w.line("{");
    w.line(&format!("static PyObject* {}(PyObject* self)", func_name));
    w.line("{");
    w.indent();
    write_cpp_self_for_slot(w, ctx, class_id, "0");
    w.line("QBuffer buffer;");
    w.line("buffer.open(QBuffer::ReadWrite);");
    w.line("QDebug dbg(&buffer);");
    let deref = if ctx.ts.entry(class.entry).is_value_type() {
        "*"
    } else {
        ""
    };
    w.line(&format!("dbg << {}cppSelf;", deref));
    w.line("buffer.close();");
    w.line("QByteArray str = buffer.data();");
    w.line("int idx = str.indexOf('(');");
    w.line("if (idx >= 0)");
    w.indented(|x| x.line("str.replace(0, idx, Py_TYPE(self)->tp_name);"));
    w.line("PyObject* mod = PyDict_GetItemString(Py_TYPE(self)->tp_dict, \"__module__\");");
    w.line("if (mod)");
    w.indented(|x| {
        x.line("return Shiboken::String::fromFormat(\"<%s.%s at %p>\", Shiboken::String::toCString(mod), str.constData(), self);")
    });
    w.line("else");
    w.indented(|x| {
        x.line("return Shiboken::String::fromFormat(\"<%s at %p>\", str.constData(), self);")
    });
    w.dedent();
    w.line("}");
    w.line("} // extern C");
    w.blank();
    func_name
}

/// On first use, compute byte offsets from the derived type to each
/// direct and indirect base by casting a dummy pointer through every
/// inheritance path.
fn write_multiple_inheritance_initializer(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    let function_name = ctx.multiple_inheritance_init_name(class);
    w.line(&format!(
        "static int* {}(const void* cptr)",
        function_name
    ));
    w.line("{");
    w.indent();
    w.line("static int mi_offsets[] = { -1 };");
    w.open_block("if (mi_offsets[0] == -1)");
    w.line("std::set<int> offsets;");
    w.line(&format!(
        "std::set<int>::iterator it;\nconst {0}* class_ptr = reinterpret_cast<const {0}*>(cptr);",
        class.qualified_cpp_name
    ));
    w.line("size_t base = (size_t) class_ptr;");
    for ancestor in mi_offset_expressions(ctx, class_id) {
        w.line(&format!("offsets.insert({});", ancestor));
    }
    w.blank();
    w.line("offsets.erase(0);");
    w.blank();
    w.open_block("if (!offsets.empty())");
    w.line("int* p = mi_offsets = new int[offsets.size() + 1];");
    w.line("for (it = offsets.begin(); it != offsets.end(); it++, p++)");
    w.indented(|x| x.line("*p = *it;"));
    w.line("*p = -1;");
    w.close_block("");
    w.close_block("");
    w.line("return mi_offsets;");
    w.dedent();
    w.line("}");
}

fn mi_offset_expressions(ctx: &EmitCtx, class_id: ClassId) -> Vec<String> {
    let class = ctx.model.class(class_id);
    let mut result = Vec::new();
    for &base in &class.base_classes {
        let base_name = &ctx.model.class(base).qualified_cpp_name;
        result.push(format!(
            "((size_t) static_cast<const {}*>(class_ptr)) - base",
            base_name
        ));
        result.push(format!(
            "((size_t) static_cast<const {}*>(({}*)((void*)class_ptr))) - base",
            base_name, class.qualified_cpp_name
        ));
    }
    for &base in &class.base_classes {
        result.extend(mi_offset_expressions(ctx, base));
    }
    result
}

fn write_special_cast_function(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    w.line(&format!(
        "static void* {}(void* obj, SbkObjectType* desiredType)",
        ctx.special_cast_function_name(class)
    ));
    w.line("{");
    w.indent();
    w.line(&format!(
        "{0}* me = reinterpret_cast< ::{0}*>(obj);",
        class.qualified_cpp_name
    ));
    for ancestor in ctx.model.all_ancestors(class_id) {
        let ancestor_class = ctx.model.class(ancestor);
        w.line(&format!(
            "if (desiredType == reinterpret_cast<SbkObjectType*>({}))",
            ctx.py_type_object_ext_entry(ancestor_class.entry)
        ));
        w.indented(|x| {
            x.line(&format!(
                "return static_cast< ::{}*>(me);",
                ancestor_class.qualified_cpp_name
            ))
        });
    }
    w.line("return me;");
    w.dedent();
    w.line("}");
}

fn write_type_discovery_function(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    w.line(&format!(
        "static void* {}_typeDiscovery(void* cptr, SbkObjectType* instanceType)",
        ctx.py_base_name_entry(class.entry)
    ));
    w.line("{");
    w.indent();
    let polymorphic_expr = ctx
        .ts
        .entry(class.entry)
        .complex_data()
        .and_then(|d| d.polymorphic_id_value.clone());
    if let Some(expr) = polymorphic_expr {
        let expr = expr.replace(
            "%1",
            &format!(
                "reinterpret_cast< ::{}*>(cptr)",
                class.qualified_cpp_name
            ),
        );
        w.line(&format!("if ({})", expr));
        w.indented(|x| x.line("return cptr;"));
    } else if class.is_polymorphic {
        for ancestor in ctx.model.all_ancestors(class_id) {
            let ancestor_class = ctx.model.class(ancestor);
            if !ancestor_class.base_classes.is_empty() {
                continue;
            }
            if ancestor_class.is_polymorphic {
                w.line(&format!(
                    "if (instanceType == reinterpret_cast<SbkObjectType*>(Shiboken::SbkType< ::{} >()))",
                    ancestor_class.qualified_cpp_name
                ));
                w.indented(|x| {
                    x.line(&format!(
                        "return dynamic_cast< ::{}*>(reinterpret_cast< ::{}*>(cptr));",
                        class.qualified_cpp_name, ancestor_class.qualified_cpp_name
                    ))
                });
            } else {
                ctx.diags.warn(format!(
                    "{} inherits from a non polymorphic type ({}), type discovery based on RTTI is impossible, write a polymorphic-id-expression for this type.",
                    class.qualified_cpp_name, ancestor_class.qualified_cpp_name
                ));
            }
        }
    }
    w.line("return 0;");
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_type_as_number_definition(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let base_name = ctx.py_base_name_entry(ctx.model.class(class_id).entry);
    let mut nb: HashMap<String, String> = HashMap::new();
    for (_, group) in operator_groups(ctx, class_id, OperatorGroupKind::Number) {
        let rfunc = ctx.model.function(group[0]);
        nb.insert(
            ctx.python_operator_function_name(rfunc),
            ctx.cpython_function_name(rfunc),
        );
    }
    if ctx.has_bool_cast(class_id) {
        nb.insert("bool".to_string(), format!("{}___nb_bool", base_name));
    }
    w.line(&format!(
        "memset(&{}_TypeAsNumber, 0, sizeof(PyNumberMethods));",
        base_name
    ));
    for (py_name, slot) in NB_FUNCS.iter() {
        let Some(func) = nb.get(*py_name) else {
            continue;
        };
        let exclude_from_py3 = *py_name == "__div__" || *py_name == "__idiv__";
        if exclude_from_py3 {
            w.line("#ifndef IS_PY3K");
        }
        w.line(&format!("{}_TypeAsNumber.{} = {};", base_name, slot, func));
        if exclude_from_py3 {
            w.line("#endif");
        }
    }
    if let Some(func) = nb.get("bool") {
        w.line(&format!("SBK_NB_BOOL({}_TypeAsNumber) = {};", base_name, func));
    }
    if let Some(func) = nb.get("__div__") {
        w.line(&format!("{}_TypeAsNumber.nb_true_divide = {};", base_name, func));
    }
}

fn write_type_as_sequence_definition(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let base_name = ctx.py_base_name_entry(ctx.model.class(class_id).entry);
    let mut funcs: HashMap<&str, String> = HashMap::new();
    let mut has_functions = false;
    for (name, _) in SEQUENCE_PROTOCOL.iter() {
        if let Some(fid) = ctx.find_class_function(class_id, name) {
            funcs.insert(
                *name,
                format!("&{}", ctx.cpython_function_name(ctx.model.function(fid))),
            );
            has_functions = true;
        }
    }
    if !has_functions {
        funcs.insert("__len__", format!("{}__len__", base_name));
        funcs.insert("__getitem__", format!("{}__getitem__", base_name));
        funcs.insert("__setitem__", format!("{}__setitem__", base_name));
    }
    w.line(&format!(
        "memset(&{}_TypeAsSequence, 0, sizeof(PySequenceMethods));",
        base_name
    ));
    for (name, slot) in SQ_FUNCS {
        let Some(func) = funcs.get(name) else {
            continue;
        };
        if *slot == "sq_slice" {
            w.line("#ifndef IS_PY3K");
        }
        w.line(&format!("{}_TypeAsSequence.{} = {};", base_name, slot, func));
        if *slot == "sq_slice" {
            w.line("#endif");
        }
    }
}

fn write_type_as_mapping_definition(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let base_name = ctx.py_base_name_entry(ctx.model.class(class_id).entry);
    w.line(&format!(
        "memset(&{}_TypeAsMapping, 0, sizeof(PyMappingMethods));",
        base_name
    ));
    for (name, slot) in MP_FUNCS {
        let Some(fid) = ctx.find_class_function(class_id, name) else {
            continue;
        };
        w.line(&format!(
            "{}_TypeAsMapping.{} = &{};",
            base_name,
            slot,
            ctx.cpython_function_name(ctx.model.function(fid))
        ));
    }
}

/// The per-class registration routine run at module init.
fn write_class_register(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) -> Result<(), GenError> {
    let class = ctx.model.class(class_id);
    let entry = ctx.ts.entry(class.entry);
    let py_type_name = ctx.py_type_name(class);
    let has_enclosing = class
        .enclosing_class
        .map(|c| ctx.ts.entry(ctx.model.class(c).entry).generate_wrapper())
        .unwrap_or(false);
    let enclosing_var = if has_enclosing { "enclosingClass" } else { "module" };

    w.line(&format!(
        "void {}(PyObject* {})",
        ctx.class_init_function_name(class),
        enclosing_var
    ));
    w.line("{");
    w.indent();

    if ctx.supports_number_protocol(class_id) {
        w.line("// type has number operators");
        write_type_as_number_definition(w, ctx, class_id);
        w.line(&format!(
            "{0}.super.ht_type.tp_as_number = &{1}_TypeAsNumber;",
            py_type_name,
            ctx.py_base_name_entry(class.entry)
        ));
        w.blank();
    }
    if ctx.supports_sequence_protocol(class_id) {
        w.line("// type supports sequence protocol");
        write_type_as_sequence_definition(w, ctx, class_id);
        w.line(&format!(
            "{0}.super.ht_type.tp_as_sequence = &{1}_TypeAsSequence;",
            py_type_name,
            ctx.py_base_name_entry(class.entry)
        ));
        w.blank();
    }
    if ctx.supports_mapping_protocol(class_id) {
        w.line("// type supports mapping protocol");
        write_type_as_mapping_definition(w, ctx, class_id);
        w.line(&format!(
            "{0}.super.ht_type.tp_as_mapping = &{1}_TypeAsMapping;",
            py_type_name,
            ctx.py_base_name_entry(class.entry)
        ));
        w.blank();
    }

    w.line(&format!(
        "{} = reinterpret_cast<PyTypeObject*>(&{});",
        ctx.py_type_object_ext_entry(class.entry),
        py_type_name
    ));
    w.blank();

    // Multiple inheritance: the bases tuple.
    let bases_var = format!("{}_bases", py_type_name);
    if class.base_classes.len() > 1 {
        w.line(&format!(
            "PyObject* {} = PyTuple_Pack({},",
            bases_var,
            class.base_classes.len()
        ));
        w.indent();
        let last = class.base_classes.len() - 1;
        for (i, &base) in class.base_classes.iter().enumerate() {
            let base_entry = ctx.model.class(base).entry;
            w.line(&format!(
                "(PyObject*){}{}",
                ctx.py_type_object_ext_entry(base_entry),
                if i == last { ");" } else { "," }
            ));
        }
        w.dedent();
        w.blank();
    }

    // introduceWrapperType call.
    w.line(&format!(
        "if (!Shiboken::ObjectType::introduceWrapperType({}, \"{}\", \"{}{}\",",
        enclosing_var,
        class.name,
        class.qualified_cpp_name,
        if entry.is_object_type() { "*" } else { "" }
    ));
    w.indent();
    let mut intro = format!("&{}", py_type_name);
    if !class.is_namespace && !class.has_private_destructor {
        let dtor_class = if (ctx.config.avoid_protected_hack && class.has_protected_destructor)
            || entry.is_value_type()
        {
            ctx.effective_class_cpp_name(class_id)
        } else {
            class.qualified_cpp_name.clone()
        };
        intro.push_str(&format!(
            ", &Shiboken::callCppDestructor< ::{} >",
            dtor_class
        ));
    } else if !class.base_classes.is_empty() || has_enclosing {
        intro.push_str(", 0");
    }
    if let Some(&first_base) = class.base_classes.first() {
        intro.push_str(&format!(
            ", (SbkObjectType*){}",
            ctx.py_type_object_ext_entry(ctx.model.class(first_base).entry)
        ));
        if class.base_classes.len() > 1 {
            intro.push_str(&format!(", {}", bases_var));
        } else if has_enclosing {
            intro.push_str(", 0");
        }
    } else if has_enclosing {
        intro.push_str(", 0, 0");
    }
    if has_enclosing {
        intro.push_str(", true");
    }
    w.line(&format!("{})) {{", intro));
    w.line("return;");
    w.dedent();
    w.line("}");
    w.blank();

    converters::write_converter_register(w, ctx, class_id)?;
    w.blank();

    let env = class_snippet_env(ctx, class_id);
    if let Some(data) = entry.complex_data() {
        for snip in data.code_snips.iter().filter(|s| {
            s.position == SnipPosition::Beginning && s.language.covers(Language::Target)
        }) {
            snippets::write_snippet(w, ctx, &env, &snip.code)?;
        }
    }

    // MI init/cast functions.
    if let Some(mi_class) = ctx.multiple_inheritance_class(class_id) {
        let func_expr = if mi_class == class_id {
            ctx.multiple_inheritance_init_name(class)
        } else {
            format!(
                "Shiboken::ObjectType::getMultipleIheritanceFunction(reinterpret_cast<SbkObjectType*>({}))",
                ctx.py_type_object_ext_entry(ctx.model.class(mi_class).entry)
            )
        };
        w.line(&format!(
            "MultipleInheritanceInitFunction func = {};",
            func_expr
        ));
        w.line(&format!(
            "Shiboken::ObjectType::setMultipleIheritanceFunction(&{}, func);",
            py_type_name
        ));
        w.line(&format!(
            "Shiboken::ObjectType::setCastFunction(&{}, &{});",
            py_type_name,
            ctx.special_cast_function_name(class)
        ));
    }

    if class.is_polymorphic && !class.base_classes.is_empty() {
        w.line(&format!(
            "Shiboken::ObjectType::setTypeDiscoveryFunctionV2(&{}, &{}_typeDiscovery);",
            py_type_name,
            ctx.py_base_name_entry(class.entry)
        ));
        w.blank();
    }

    // Nested enums.
    if !class.enums.is_empty() {
        w.line("// Initialization of enums.");
        w.blank();
        for &enum_id in &class.enums {
            enums::write_enum_initialization(
                w,
                ctx,
                enum_id,
                &format!("&{}", py_type_name),
                "",
            )?;
        }
    }

    if ctx.config.enable_pyside_extensions
        && class.is_qobject
        && class
            .functions
            .iter()
            .any(|&f| ctx.model.function(f).flags.is_signal)
    {
        w.line(&format!(
            "PySide::Signal::registerSignals(&{}, &::{}::staticMetaObject);",
            py_type_name, class.qualified_cpp_name
        ));
    }

    // Static fields land in the type dict.
    for field in &class.fields {
        if !field.is_static {
            continue;
        }
        w.line(&format!(
            "PyDict_SetItemString({}.super.ht_type.tp_dict, \"{}\", {});",
            py_type_name,
            field.name,
            ctx.to_python_conversion(
                &field.ty,
                &format!("{}::{}", class.qualified_cpp_name, field.name)
            )
        ));
    }
    w.blank();

    if let Some(data) = entry.complex_data() {
        for snip in data
            .code_snips
            .iter()
            .filter(|s| s.position == SnipPosition::End && s.language.covers(Language::Target))
        {
            snippets::write_snippet(w, ctx, &env, &snip.code)?;
        }
    }

    if ctx.config.enable_pyside_extensions {
        write_init_qt_meta_types(w, ctx, class_id);
        if class.is_qobject {
            w.line(&format!(
                "Shiboken::ObjectType::setSubTypeInitHook(&{}, &PySide::initQObjectSubType);",
                py_type_name
            ));
            w.line(&format!(
                "PySide::initDynamicMetaObject(&{0}, &::{1}::staticMetaObject, sizeof(::{1}));",
                py_type_name, class.qualified_cpp_name
            ));
        }
    }

    w.dedent();
    w.line("}");
    w.blank();
    Ok(())
}

fn write_init_qt_meta_types(w: &mut CppWriter, ctx: &EmitCtx, class_id: ClassId) {
    let class = ctx.model.class(class_id);
    if class.is_namespace || class.is_abstract {
        return;
    }
    let entry = ctx.ts.entry(class.entry);
    let can_be_value = entry.is_value_type()
        && class.functions.iter().any(|&f| {
            let func = ctx.model.function(f);
            func.flags.is_constructor && func.arguments.is_empty()
        });
    if can_be_value {
        w.line(&format!(
            "qRegisterMetaType< ::{} >(\"{}\");",
            class.qualified_cpp_name, class.name
        ));
    }
    for &enum_id in &class.enums {
        let entity = ctx.model.enum_entity(enum_id);
        if entity.is_anonymous {
            continue;
        }
        let enum_entry = ctx.ts.entry(entity.entry);
        w.line(&format!(
            "qRegisterMetaType< ::{} >(\"{}::{}\");",
            enum_entry.qualified_cpp_name,
            class.name,
            enum_entry.name()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_fixtures::ModelBuilder;
    use sbkgen_model::OperatorKind;

    #[test]
    fn class_unit_contains_type_object_and_register() {
        let mut b = ModelBuilder::new();
        let point = b.value_class("Point");
        b.constructor(point, &[]);
        let int_ty = b.int_ty();
        b.method(point, "x", &[], Some(int_ty));
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_unit(&ctx, point).unwrap();
        assert!(out.contains("static SbkObjectType Sbk_Point_Type = { { {"));
        assert!(out.contains("void init_Point(PyObject* module)"));
        assert!(out.contains("Shiboken::ObjectType::introduceWrapperType(module, \"Point\", \"Point\","));
        assert!(out.contains("static PyMethodDef Sbk_Point_methods[] = {"));
        assert!(out.contains("\"__copy__\""));
        assert!(out.contains("/*tp_init"));
        assert!(out.contains("Sbk_Point_Init"));
    }

    #[test]
    fn object_type_registers_with_pointer_suffix() {
        let mut b = ModelBuilder::new();
        let widget = b.object_class("Widget");
        b.constructor(widget, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_unit(&ctx, widget).unwrap();
        assert!(out.contains("\"Widget\", \"Widget*\","));
        assert!(!out.contains("__copy__"));
    }

    #[test]
    fn header_declares_wrapper_with_virtual_override() {
        let mut b = ModelBuilder::new();
        let handler = b.object_class("Handler");
        b.constructor(handler, &[]);
        let int_ty = b.int_ty();
        let f = b.method(handler, "handle", &[("v", int_ty)], None);
        b.function_mut(f).flags.is_virtual = true;
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_header(&ctx, handler).unwrap();
        assert!(out.contains("#ifndef SBK_HANDLERWRAPPER_H"));
        assert!(out.contains("class HandlerWrapper : public Handler"));
        assert!(out.contains("virtual void handle(int v);"));
        assert!(out.contains("virtual ~HandlerWrapper();"));
    }

    #[test]
    fn abstract_class_without_wrapper_needs_no_subclass_decl() {
        let mut b = ModelBuilder::new();
        let plain = b.value_class("Plain");
        b.constructor(plain, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_header(&ctx, plain).unwrap();
        assert!(!out.contains("class PlainWrapper"));
        assert!(out.contains("#endif // SBK_PLAINWRAPPER_H"));
    }

    #[test]
    fn comparison_operators_produce_richcompare() {
        let mut b = ModelBuilder::new();
        let point = b.value_class("Point");
        b.constructor(point, &[]);
        let other = b.const_ref_ty(point);
        let bool_ty = b.bool_ty();
        b.operator(
            point,
            "==",
            OperatorKind::Comparison,
            &[("other", other)],
            Some(bool_ty),
        );
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_unit(&ctx, point).unwrap();
        assert!(out.contains("_richcompare(PyObject* self, PyObject* pyArg, int op)"));
        assert!(out.contains("case Py_EQ:"));
        assert!(out.contains("pyResult = Py_False;"));
        assert!(out.contains("/*tp_richcompare"));
        assert!(out.contains("Sbk_Point_richcompare,"));
    }

    #[test]
    fn private_destructor_uses_special_dealloc() {
        let mut b = ModelBuilder::new();
        let single = b.object_class("Singleton");
        b.model.class_mut(single).has_private_destructor = true;
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_unit(&ctx, single).unwrap();
        assert!(out.contains("SbkDeallocWrapperWithPrivateDtor"));
        assert!(!out.contains("SbkObjectTpNew"));
    }

    #[test]
    fn fields_produce_getset_table() {
        let mut b = ModelBuilder::new();
        let point = b.value_class("Point");
        b.constructor(point, &[]);
        let int_ty = b.int_ty();
        b.model.class_mut(point).fields.push(sbkgen_model::Field {
            name: "x".into(),
            ty: int_ty,
            is_static: false,
            is_protected: false,
        });
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_unit(&ctx, point).unwrap();
        assert!(out.contains("static PyObject* Sbk_Point_get_x(PyObject* self, void*)"));
        assert!(out.contains("static int Sbk_Point_set_x(PyObject* self, PyObject* pyIn, void*)"));
        assert!(out.contains("static PyGetSetDef Sbk_Point_getsetlist[] = {"));
        assert!(out.contains("Sbk_Point_getsetlist,"));
    }

    #[test]
    fn polymorphic_derived_class_gets_type_discovery() {
        let mut b = ModelBuilder::new();
        let base = b.object_class("Base");
        let derived = b.derived_class("Derived", base);
        b.constructor(derived, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_unit(&ctx, derived).unwrap();
        assert!(out.contains("Sbk_Derived_typeDiscovery(void* cptr, SbkObjectType* instanceType)"));
        assert!(out.contains("dynamic_cast< ::Derived*>"));
        assert!(out.contains("setTypeDiscoveryFunctionV2"));
    }

    #[test]
    fn multiple_inheritance_emits_offset_glue() {
        let mut b = ModelBuilder::new();
        let a = b.object_class("A");
        let c = b.object_class("C");
        let multi = b.object_class("Multi");
        b.model.class_mut(multi).base_classes = vec![a, c];
        b.constructor(multi, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = generate_class_unit(&ctx, multi).unwrap();
        assert!(out.contains("Sbk_Multi_mi_init"));
        assert!(out.contains("SpecialCastFunction"));
        assert!(out.contains("PyTuple_Pack(2,"));
        assert!(out.contains("copyMultipleInheritance") || out.contains("setMultipleIheritanceFunction"));
    }
}

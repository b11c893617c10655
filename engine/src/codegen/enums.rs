// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Enum and flags support: the converter trio for both, the QFlags
//! number-protocol methods, and the per-enum initialisation run during
//! class or module registration.

use sbkgen_model::{AbstractType, EnumId, TypeEntryId, TypeEntryKind};

use super::converters::{
    write_add_python_to_cpp_conversion, write_cpp_to_python_function,
    write_is_convertible_function, write_python_to_cpp_function,
};
use super::EmitCtx;
use crate::errors::GenError;
use crate::writer::CppWriter;

fn flags_companion(ctx: &EmitCtx, enum_entry: TypeEntryId) -> Option<TypeEntryId> {
    match &ctx.ts.entry(enum_entry).kind {
        TypeEntryKind::Enum { flags, .. } => *flags,
        _ => None,
    }
}

/// The converter trio for an enum entry, its flags companion, and the
/// number-to-flags fallback.
pub(crate) fn write_enum_converter_functions(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    enum_id: EnumId,
) -> Result<(), GenError> {
    let entity = ctx.model.enum_entity(enum_id);
    if entity.is_anonymous {
        return Ok(());
    }
    write_enum_converter_functions_for_entry(w, ctx, entity.entry)
}

pub(crate) fn write_enum_converter_functions_for_entry(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    entry_id: TypeEntryId,
) -> Result<(), GenError> {
    let entry = ctx.ts.entry(entry_id);
    let type_name = ctx.fixed_type_name_entry(entry_id, None);
    let python_type = ctx.py_type_object_ext_entry(entry_id);
    let cpp_type_name = format!("::{}", entry.qualified_cpp_name);

    // Python to C++.
    let to_cpp_body = if entry.is_flags() {
        format!(
            "*(({0}*)cppOut) = {0}(QFlag(PySide::QFlags::getValue(reinterpret_cast<PySideQFlagsObject*>(pyIn))));",
            cpp_type_name
        )
    } else {
        format!(
            "*(({0}*)cppOut) = ({0}) Shiboken::Enum::getValue(pyIn);",
            cpp_type_name
        )
    };
    write_python_to_cpp_function(w, &to_cpp_body, &type_name, &type_name);
    let py_type_check = format!("PyObject_TypeCheck(pyIn, {})", python_type);
    write_is_convertible_function(w, &type_name, &type_name, &py_type_check, false);

    // C++ to Python.
    let to_python_body = if entry.is_flags() {
        format!(
            "int castCppIn = *(({}*)cppIn);\nreturn reinterpret_cast<PyObject*>(PySide::QFlags::newObject(castCppIn, {}));",
            cpp_type_name, python_type
        )
    } else {
        format!(
            "int castCppIn = *(({}*)cppIn);\nreturn Shiboken::Enum::newItem({}, castCppIn);",
            cpp_type_name, python_type
        )
    };
    write_cpp_to_python_function(w, &to_python_body, &type_name, &type_name);
    w.blank();

    if entry.is_flags() {
        return Ok(());
    }
    let Some(flags) = flags_companion(ctx, entry_id) else {
        return Ok(());
    };

    // The flags companion gets its own trio plus conversions from the
    // originator enum and from arbitrary numbers.
    write_enum_converter_functions_for_entry(w, ctx, flags)?;

    let flags_type_name = ctx.fixed_type_name_entry(flags, None);
    let flags_cpp_name = format!("::{}", ctx.ts.entry(flags).qualified_cpp_name);

    write_python_to_cpp_function(
        w,
        &format!(
            "*(({0}*)cppOut) = {0}(QFlag(Shiboken::Enum::getValue(pyIn)));",
            flags_cpp_name
        ),
        &type_name,
        &flags_type_name,
    );
    write_is_convertible_function(w, &type_name, &flags_type_name, &py_type_check, false);

    write_python_to_cpp_function(
        w,
        &format!(
            "Shiboken::AutoDecRef pyLong(PyNumber_Long(pyIn));\n*(({0}*)cppOut) = {0}(QFlag(PyLong_AsLong(pyLong.object())));",
            flags_cpp_name
        ),
        "number",
        &flags_type_name,
    );
    write_is_convertible_function(w, "number", &flags_type_name, "PyNumber_Check(pyIn)", false);
    Ok(())
}

/// The number-protocol methods of a flags type over the originator
/// enum's underlying integer.
pub(crate) fn write_flags_methods(w: &mut CppWriter, ctx: &EmitCtx, enum_id: EnumId) {
    let entity = ctx.model.enum_entity(enum_id);
    let Some(flags) = flags_companion(ctx, entity.entry) else {
        return;
    };
    for (py_op, cpp_op) in [("and", "&"), ("or", "|"), ("xor", "^")] {
        write_flags_binary_operator(w, ctx, entity.entry, flags, py_op, cpp_op);
    }
    write_flags_unary_operator(w, ctx, entity.entry, flags, "invert", "~");
    write_flags_to_long(w, ctx, entity.entry, flags);
    write_flags_nonzero(w, ctx, entity.entry, flags);
    w.blank();
}

fn flags_to_cpp_call(ctx: &EmitCtx, flags: TypeEntryId, py_var: &str, cpp_var: &str) -> String {
    let flags_type = AbstractType::plain(flags);
    format!(
        "{}{}, &{});",
        ctx.to_cpp_conversion_function(&flags_type),
        py_var,
        cpp_var
    )
}

fn write_flags_binary_operator(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    enum_entry: TypeEntryId,
    flags: TypeEntryId,
    py_op: &str,
    cpp_op: &str,
) {
    let enum_name = ctx.py_base_name_entry(enum_entry);
    let flags_cpp = format!("::{}", ctx.ts.entry(flags).qualified_cpp_name);
    let flags_type = AbstractType::plain(flags);
    w.line(&format!(
        "PyObject* {}___{}__(PyObject* self, PyObject* pyArg)",
        enum_name, py_op
    ));
    w.line("{");
    w.indent();
    w.line(&format!("{} cppResult, cppSelf, cppArg;", flags_cpp));
    w.line("#ifdef IS_PY3K");
    w.line(&format!("cppSelf = ({})PyLong_AsLong(self);", flags_cpp));
    w.line(&format!("cppArg = ({})PyLong_AsLong(pyArg);", flags_cpp));
    w.line("#else");
    w.line(&format!("cppSelf = ({})PyInt_AsLong(self);", flags_cpp));
    w.line(&format!("cppArg = ({})PyInt_AsLong(pyArg);", flags_cpp));
    w.line("#endif");
    w.blank();
    w.line(&format!("cppResult = cppSelf {} cppArg;", cpp_op));
    w.line(&format!(
        "return {};",
        ctx.to_python_conversion(&flags_type, "cppResult")
    ));
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_flags_unary_operator(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    enum_entry: TypeEntryId,
    flags: TypeEntryId,
    py_op: &str,
    cpp_op: &str,
) {
    let enum_name = ctx.py_base_name_entry(enum_entry);
    let flags_cpp = format!("::{}", ctx.ts.entry(flags).qualified_cpp_name);
    let flags_type = AbstractType::plain(flags);
    w.line(&format!(
        "PyObject* {}___{}__(PyObject* self, PyObject* pyArg)",
        enum_name, py_op
    ));
    w.line("{");
    w.indent();
    w.line(&format!("{} cppSelf;", flags_cpp));
    w.line(&flags_to_cpp_call(ctx, flags, "self", "cppSelf"));
    w.line(&format!("{} cppResult = {}cppSelf;", flags_cpp, cpp_op));
    w.line(&format!(
        "return {};",
        ctx.to_python_conversion(&flags_type, "cppResult")
    ));
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_flags_to_long(w: &mut CppWriter, ctx: &EmitCtx, enum_entry: TypeEntryId, flags: TypeEntryId) {
    let enum_name = ctx.py_base_name_entry(enum_entry);
    w.line(&format!("static PyObject* {}_long(PyObject* self)", enum_name));
    w.line("{");
    w.indent();
    w.line("int val;");
    w.line(&flags_to_cpp_call(ctx, flags, "self", "val"));
    w.line("return Shiboken::Conversions::copyToPython(Shiboken::Conversions::PrimitiveTypeConverter<int>(), &val);");
    w.dedent();
    w.line("}");
}

fn write_flags_nonzero(w: &mut CppWriter, ctx: &EmitCtx, enum_entry: TypeEntryId, flags: TypeEntryId) {
    let enum_name = ctx.py_base_name_entry(enum_entry);
    w.line(&format!("static int {}__nonzero(PyObject* self)", enum_name));
    w.line("{");
    w.indent();
    w.line("int val;");
    w.line(&flags_to_cpp_call(ctx, flags, "self", "val"));
    w.line("return val != 0;");
    w.dedent();
    w.line("}");
}

/// The `PyNumberMethods` table wiring the flags operators in.
pub(crate) fn write_flags_number_methods_definition(w: &mut CppWriter, ctx: &EmitCtx, enum_id: EnumId) {
    let entity = ctx.model.enum_entity(enum_id);
    if flags_companion(ctx, entity.entry).is_none() {
        return;
    }
    let name = ctx.py_base_name_entry(entity.entry);
    w.line(&format!("static PyNumberMethods {}_as_number = {{", name));
    w.indent();
    w.line("/*nb_add*/                  0,");
    w.line("/*nb_subtract*/             0,");
    w.line("/*nb_multiply*/             0,");
    w.line("#ifndef IS_PY3K");
    w.line("/* nb_divide */             0,");
    w.line("#endif");
    w.line("/*nb_remainder*/            0,");
    w.line("/*nb_divmod*/               0,");
    w.line("/*nb_power*/                0,");
    w.line("/*nb_negative*/             0,");
    w.line("/*nb_positive*/             0,");
    w.line("/*nb_absolute*/             0,");
    w.line(&format!("/*nb_nonzero*/              {}__nonzero,", name));
    w.line(&format!("/*nb_invert*/               (unaryfunc){}___invert__,", name));
    w.line("/*nb_lshift*/               0,");
    w.line("/*nb_rshift*/               0,");
    w.line(&format!("/*nb_and*/                  (binaryfunc){}___and__,", name));
    w.line(&format!("/*nb_xor*/                  (binaryfunc){}___xor__,", name));
    w.line(&format!("/*nb_or*/                   (binaryfunc){}___or__,", name));
    w.line("#ifndef IS_PY3K");
    w.line("/* nb_coerce */             0,");
    w.line("#endif");
    w.line(&format!("/*nb_int*/                  {}_long,", name));
    w.line("#ifdef IS_PY3K");
    w.line("/*nb_reserved*/             0,");
    w.line("/*nb_float*/                0,");
    w.line("#else");
    w.line(&format!("/*nb_long*/                 {}_long,", name));
    w.line("/*nb_float*/                0,");
    w.line("/*nb_oct*/                  0,");
    w.line("/*nb_hex*/                  0,");
    w.line("#endif");
    w.line("/*nb_inplace_add*/          0,");
    w.line("/*nb_inplace_subtract*/     0,");
    w.line("/*nb_inplace_multiply*/     0,");
    w.line("#ifndef IS_PY3K");
    w.line("/*nb_inplace_divide*/       0,");
    w.line("#endif");
    w.line("/*nb_inplace_remainder*/    0,");
    w.line("/*nb_inplace_power*/        0,");
    w.line("/*nb_inplace_lshift*/       0,");
    w.line("/*nb_inplace_rshift*/       0,");
    w.line("/*nb_inplace_and*/          0,");
    w.line("/*nb_inplace_xor*/          0,");
    w.line("/*nb_inplace_or*/           0,");
    w.line("/*nb_floor_divide*/         0,");
    w.line("/*nb_true_divide*/          0,");
    w.line("/*nb_inplace_floor_divide*/ 0,");
    w.line("/*nb_inplace_true_divide*/  0,");
    w.line("/*nb_index*/                0");
    w.dedent();
    w.line("};");
    w.blank();
}

/// Per-enum initialisation: create the Python enum (and flags) type,
/// add items, register converters. `enclosing_object` is the variable
/// holding the scope ("module" or a type object address).
pub(crate) fn write_enum_initialization(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    enum_id: EnumId,
    enclosing_object: &str,
    ec: &str,
) -> Result<(), GenError> {
    let entity = ctx.model.enum_entity(enum_id);
    let entry = ctx.ts.entry(entity.entry);
    let scoped = enclosing_object != "module";
    let enum_python_type = ctx.py_type_object_ext_entry(entity.entry);

    w.line(&format!(
        "// Initialization of {} '{}'.",
        if entity.is_anonymous {
            "anonymous enum identified by enum value"
        } else {
            "enum"
        },
        entry.name()
    ));

    let flags = flags_companion(ctx, entity.entry);
    if !entity.is_anonymous {
        if let Some(flags) = flags {
            w.line(&format!(
                "{} = PySide::QFlags::create(\"{}\", &{}_as_number);",
                ctx.py_type_object_ext_entry(flags),
                ctx.ts.entry(flags).name(),
                ctx.py_base_name_entry(entity.entry)
            ));
        }
        let scope_prefix = entity
            .owner_class
            .map(|c| format!("{}::", ctx.model.class(c).qualified_cpp_name))
            .unwrap_or_default();
        w.line(&format!(
            "{} = Shiboken::Enum::{}({},",
            enum_python_type,
            if scoped {
                "createScopedEnum"
            } else {
                "createGlobalEnum"
            },
            enclosing_object
        ));
        w.indent();
        w.line(&format!("\"{}\",", entry.name()));
        w.line(&format!(
            "\"{}.{}\",",
            entry.package, entry.target_lang_name
        ));
        if let Some(flags) = flags {
            w.line(&format!("\"{}{}\",", scope_prefix, entry.name()));
            w.line(&format!("{});", ctx.py_type_object_ext_entry(flags)));
        } else {
            w.line(&format!("\"{}{}\");", scope_prefix, entry.name()));
        }
        w.dedent();
        w.line(&format!("if (!{})", enum_python_type));
        w.indented(|w| w.line(&format!("return {};", ec)));
        w.blank();
    }

    let rejected: &[String] = match &entry.kind {
        TypeEntryKind::Enum {
            rejected_values, ..
        } => rejected_values,
        _ => &[],
    };
    for value in &entity.values {
        if rejected.contains(&value.name) {
            continue;
        }
        let value_text = if !ctx.config.avoid_protected_hack || !entity.is_protected {
            let scope = entity
                .owner_class
                .map(|c| format!("{}::", ctx.model.class(c).qualified_cpp_name))
                .unwrap_or_default();
            format!("(long) {}{}", scope, value.name)
        } else {
            // Protected enums cannot be named from the wrapper; bake
            // the numeric value in.
            format!("{}", value.value)
        };

        if entity.is_anonymous {
            if scoped {
                w.open_block("");
                w.line(&format!(
                    "PyObject* anonEnumItem = PyInt_FromLong({});",
                    value_text
                ));
                w.line(&format!(
                    "if (PyDict_SetItemString(((SbkObjectType*){})->super.ht_type.tp_dict, \"{}\", anonEnumItem) < 0)",
                    enclosing_object, value.name
                ));
                w.indented(|w| w.line(&format!("return {};", ec)));
                w.line("Py_DECREF(anonEnumItem);");
                w.close_block("");
            } else {
                w.line(&format!(
                    "if (PyModule_AddIntConstant(module, \"{}\", {}) < 0)",
                    value.name, value_text
                ));
                w.indented(|w| w.line(&format!("return {};", ec)));
            }
        } else {
            w.line(&format!(
                "if (!Shiboken::Enum::{}({},",
                if scoped {
                    "createScopedEnumItem"
                } else {
                    "createGlobalEnumItem"
                },
                enum_python_type
            ));
            w.indented(|w| {
                w.line(&format!(
                    "{}, \"{}\", {}))",
                    enclosing_object, value.name, value_text
                ));
                w.line(&format!("return {};", ec));
            });
        }
    }

    if !entity.is_anonymous {
        write_enum_converter_initialization(w, ctx, entity.entry);
    }

    w.line(&format!(
        "// End of '{}' enum{}.",
        entry.name(),
        if flags.is_some() { "/flags" } else { "" }
    ));
    w.blank();
    Ok(())
}

pub(crate) fn write_enum_converter_initialization(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    entry_id: TypeEntryId,
) {
    let entry = ctx.ts.entry(entry_id);
    let is_flags = entry.is_flags();
    let enum_python_type = ctx.py_type_object_ext_entry(entry_id);
    let type_name = ctx.fixed_type_name_entry(entry_id, None);

    w.line(&format!(
        "// Register converter for {} '{}'.",
        if is_flags { "flag" } else { "enum" },
        entry.qualified_cpp_name
    ));
    w.open_block("");
    w.line(&format!(
        "SbkConverter* converter = Shiboken::Conversions::createConverter({},",
        enum_python_type
    ));
    w.indented(|w| w.line(&format!("{});", ctx.cpp_to_python_fn(&type_name, &type_name))));

    if is_flags {
        if let TypeEntryKind::Flags { originator } = &entry.kind {
            let enum_type_name = ctx.fixed_type_name_entry(*originator, None);
            write_add_python_to_cpp_conversion(
                w,
                "converter",
                &ctx.python_to_cpp_fn(&enum_type_name, &type_name),
                &ctx.is_convertible_fn(&enum_type_name, &type_name),
            );
        }
    }
    write_add_python_to_cpp_conversion(
        w,
        "converter",
        &ctx.python_to_cpp_fn(&type_name, &type_name),
        &ctx.is_convertible_fn(&type_name, &type_name),
    );
    if is_flags {
        write_add_python_to_cpp_conversion(
            w,
            "converter",
            &ctx.python_to_cpp_fn("number", &type_name),
            &ctx.is_convertible_fn("number", &type_name),
        );
    }

    w.line(&format!(
        "Shiboken::Enum::setTypeConverter({}, converter);",
        enum_python_type
    ));
    let segments: Vec<&str> = entry.qualified_cpp_name.split("::").collect();
    for start in 0..segments.len() {
        let signature = segments[start..].join("::");
        w.line(&format!(
            "Shiboken::Conversions::registerConverterName(converter, \"{}{}\");",
            if is_flags { "QFlags<" } else { "" },
            signature
        ));
    }
    w.close_block("");

    if !is_flags {
        if let TypeEntryKind::Enum {
            flags: Some(flags), ..
        } = &entry.kind
        {
            write_enum_converter_initialization(w, ctx, *flags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_fixtures::ModelBuilder;
    use sbkgen_model::{EnumEntity, EnumValue, TypeEntry, WrapperGeneration};

    fn enum_with_flags(b: &mut ModelBuilder) -> EnumId {
        let enum_entry = b.ts.add_entry(TypeEntry {
            qualified_cpp_name: "Qt::WindowState".into(),
            target_lang_name: "WindowState".into(),
            package: "sample".into(),
            generation: WrapperGeneration::TargetLang,
            include: None,
            extra_includes: Vec::new(),
            custom_conversion: None,
            kind: TypeEntryKind::Enum {
                flags: None,
                value_names: vec!["Normal".into(), "Minimized".into()],
                rejected_values: Vec::new(),
            },
        });
        let flags_entry = b.ts.add_entry(TypeEntry {
            qualified_cpp_name: "Qt::WindowStates".into(),
            target_lang_name: "WindowStates".into(),
            package: "sample".into(),
            generation: WrapperGeneration::TargetLang,
            include: None,
            extra_includes: Vec::new(),
            custom_conversion: None,
            kind: TypeEntryKind::Flags {
                originator: enum_entry,
            },
        });
        if let TypeEntryKind::Enum { flags, .. } = &mut b.ts.entry_mut(enum_entry).kind {
            *flags = Some(flags_entry);
        }
        b.model.add_enum(EnumEntity {
            entry: enum_entry,
            owner_class: None,
            values: vec![
                EnumValue {
                    name: "Normal".into(),
                    value: 0,
                },
                EnumValue {
                    name: "Minimized".into(),
                    value: 1,
                },
            ],
            is_anonymous: false,
            is_protected: false,
        })
    }

    #[test]
    fn enum_with_flags_emits_both_converters() {
        let mut b = ModelBuilder::new();
        let e = enum_with_flags(&mut b);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_enum_converter_functions(&mut w, &ctx, e).unwrap();
        let out = w.into_string();
        assert!(out.contains("Shiboken::Enum::getValue(pyIn)"));
        assert!(out.contains("QFlag(PySide::QFlags::getValue"));
        assert!(out.contains("number_PythonToCpp_"));
        assert!(out.contains("PyNumber_Check(pyIn)"));
    }

    #[test]
    fn enum_initialization_creates_items() {
        let mut b = ModelBuilder::new();
        let e = enum_with_flags(&mut b);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_enum_initialization(&mut w, &ctx, e, "module", "SBK_MODULE_INIT_ERROR").unwrap();
        let out = w.into_string();
        assert!(out.contains("createGlobalEnum"));
        assert!(out.contains("\"Normal\""));
        assert!(out.contains("\"Minimized\""));
        assert!(out.contains("setTypeConverter"));
        assert!(out.contains("registerConverterName(converter, \"QFlags<Qt::WindowStates\")"));
    }
}

// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Emits, for every referenced type, the converter trio the generated
//! wrappers call: Python->C++, C++->Python and the is-convertible
//! predicate (which returns the conversion function pointer so check
//! and selection happen in one step). Also emits the registration calls
//! run at module-init time.

use once_cell::sync::Lazy;
use regex::Regex;

use sbkgen_model::{
    AbstractType, ClassId, ContainerKind, CustomConversion, FunctionId, TargetToNativeConversion,
    TypeEntryId,
};

use super::EmitCtx;
use crate::errors::GenError;
use crate::writer::CppWriter;

/// Captures the receiving variable of a `%out`-style container snippet
/// assignment, for the value-with-copy-constructor-only rewrite. The
/// match is by textual variable name; an identifier that doubles as a
/// type member would be rewritten too.
static OUT_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\*?%?[a-zA-Z_][\w.]*(?:\[[^\[<>]+\])*)\s+=\s+%CONVERTTOCPP\[[^\[]*\]\(")
        .expect("container rewrite regex")
});

impl<'a> EmitCtx<'a> {
    /// Build an `AbstractType` from a textual C++ spelling, resolving
    /// the entry by qualified name. Understands `const`, `*`, `&` and
    /// one level of template-argument nesting per recursion step.
    pub fn parse_type_string(&self, spelling: &str) -> Option<AbstractType> {
        let mut text = spelling.trim();
        let mut is_constant = false;
        if let Some(rest) = text.strip_prefix("const ") {
            text = rest.trim();
            is_constant = true;
        }
        let mut is_reference = false;
        let mut indirections = 0u8;
        loop {
            let trimmed = text.trim_end();
            if let Some(rest) = trimmed.strip_suffix('&') {
                is_reference = true;
                text = rest;
            } else if let Some(rest) = trimmed.strip_suffix('*') {
                indirections += 1;
                text = rest;
            } else {
                text = trimmed;
                break;
            }
        }
        let (base, instantiations) = match text.find('<') {
            Some(open) => {
                let close = text.rfind('>')?;
                let inner = &text[open + 1..close];
                let args: Option<Vec<AbstractType>> = split_template_args(inner)
                    .into_iter()
                    .map(|arg| self.parse_type_string(arg))
                    .collect();
                (text[..open].trim(), args?)
            }
            None => (text, Vec::new()),
        };
        let entry = self.ts.find_type(base)?;
        Some(AbstractType {
            entry,
            indirections,
            is_reference,
            is_constant,
            instantiations,
            array_element: None,
            original_template: None,
        })
    }

    /// The type-check prefix for a named Python type used in a type
    /// replacement, e.g. "PySequence" -> "PySequence_Check". Returns
    /// `(check, parsed_type)`; a parsed type means the name was a real
    /// C++ type and the normal machinery applies.
    pub fn guess_check_function(&self, name: &str) -> (Option<String>, Option<AbstractType>) {
        match name {
            "PyTypeObject" => (Some("PyType_Check".to_string()), None),
            "PyBuffer" => (Some("Shiboken::Buffer::checkType".to_string()), None),
            "str" => (Some("Shiboken::String::check".to_string()), None),
            _ => match self.parse_type_string(name) {
                Some(ty) if !self.ts.entry(ty.entry).is_custom() => (None, Some(ty)),
                _ => (Some(format!("{}_Check", name)), None),
            },
        }
    }

    /// The open-call check prefix for a type: either a bare function
    /// name (closed by appending `(arg)`) or a prefix ending with ", "
    /// (closed by appending `arg)`).
    pub fn check_function(&self, ty: &AbstractType) -> String {
        let entry = self.ts.entry(ty.entry);
        if entry.is_custom() {
            let (check, parsed) = self.guess_check_function(entry.name());
            if let Some(check) = check {
                return check;
            }
            if let Some(parsed) = parsed {
                return self.check_function(&parsed);
            }
        }
        if self.is_cstring(ty) {
            return "Shiboken::String::check".to_string();
        }
        if self.is_void_pointer(ty) {
            return "PyObject_Check".to_string();
        }
        if entry.is_container() {
            return self.container_check_function(ty);
        }
        self.check_function_entry(ty.entry)
    }

    pub fn check_function_entry(&self, entry_id: TypeEntryId) -> String {
        let entry = self.ts.entry(entry_id);
        if entry.is_custom() {
            let (check, parsed) = self.guess_check_function(entry.name());
            if let Some(parsed) = parsed {
                return self.check_function(&parsed);
            }
            if let Some(check) = check {
                return check;
            }
        }
        if entry.is_enum() || entry.is_flags() || self.is_wrapper_entry(entry_id) {
            return format!(
                "SbkObject_TypeCheck({}, ",
                self.py_type_object_ext_entry(entry_id)
            );
        }
        if entry.is_cpp_primitive() {
            return format!("{}_Check", self.py_base_name_entry(entry_id));
        }
        // User primitives check through their converter.
        if entry.target_lang_name == entry.name() {
            self.is_convertible_function_entry(entry_id)
        } else if entry.target_lang_name == "PyUnicode" {
            "Shiboken::String::check".to_string()
        } else {
            format!("{}_Check", entry.target_lang_name)
        }
    }

    fn container_check_function(&self, ty: &AbstractType) -> String {
        let kind = self
            .ts
            .entry(ty.entry)
            .container_kind()
            .expect("container entry");
        match kind {
            ContainerKind::List
            | ContainerKind::StringList
            | ContainerKind::LinkedList
            | ContainerKind::Vector
            | ContainerKind::Stack
            | ContainerKind::Set
            | ContainerKind::Queue => {
                let inner = &ty.instantiations[0];
                if self.is_pointer_to_wrapper(inner) {
                    format!(
                        "Shiboken::Conversions::checkSequenceTypes({}, ",
                        self.py_type_object_ext(inner)
                    )
                } else if self.is_wrapper_type(inner) {
                    format!(
                        "Shiboken::Conversions::convertibleSequenceTypes((SbkObjectType*){}, ",
                        self.py_type_object_ext(inner)
                    )
                } else {
                    format!(
                        "Shiboken::Conversions::convertibleSequenceTypes({}, ",
                        self.converter_object(inner)
                    )
                }
            }
            ContainerKind::Map
            | ContainerKind::MultiMap
            | ContainerKind::Hash
            | ContainerKind::MultiHash
            | ContainerKind::Pair => {
                let py_type = if kind == ContainerKind::Pair {
                    "Pair"
                } else {
                    "Dict"
                };
                let first = &ty.instantiations[0];
                let second = ty.instantiations.last().expect("two instantiations");
                if self.is_pointer_to_wrapper(first) && self.is_pointer_to_wrapper(second) {
                    format!(
                        "Shiboken::Conversions::check{}Types({}, {}, ",
                        py_type,
                        self.py_type_object_ext(first),
                        self.py_type_object_ext(second)
                    )
                } else {
                    format!(
                        "Shiboken::Conversions::convertible{}Types({}, {}, {}, {}, ",
                        py_type,
                        self.converter_object(first),
                        self.is_pointer_to_wrapper(first),
                        self.converter_object(second),
                        self.is_pointer_to_wrapper(second)
                    )
                }
            }
        }
    }

    /// The open-call is-convertible prefix for a type use.
    pub fn is_convertible_function(&self, ty: &AbstractType) -> String {
        let entry = self.ts.entry(ty.entry);
        if entry.is_custom() {
            let (check, parsed) = self.guess_check_function(entry.name());
            if let Some(check) = check {
                return check;
            }
            if let Some(parsed) = parsed {
                return self.is_convertible_function(&parsed);
            }
        }
        if self.is_wrapper_type(ty) {
            let kind = if ty.is_pointer() || self.is_value_type_with_copy_ctor_only(ty.entry) {
                "isPythonToCppPointerConvertible"
            } else if ty.is_reference {
                "isPythonToCppReferenceConvertible"
            } else {
                "isPythonToCppValueConvertible"
            };
            return format!(
                "Shiboken::Conversions::{}((SbkObjectType*){}, ",
                kind,
                self.py_type_object_ext(ty)
            );
        }
        format!(
            "Shiboken::Conversions::isPythonToCppConvertible({}, ",
            self.converter_object(ty)
        )
    }

    pub fn is_convertible_function_entry(&self, entry_id: TypeEntryId) -> String {
        if self.is_wrapper_entry(entry_id) {
            let entry = self.ts.entry(entry_id);
            let kind = if entry.is_value_type()
                && !self.is_value_type_with_copy_ctor_only(entry_id)
            {
                "isPythonToCppValueConvertible"
            } else {
                "isPythonToCppPointerConvertible"
            };
            return format!(
                "Shiboken::Conversions::{}((SbkObjectType*){}, ",
                kind,
                self.py_type_object_ext_entry(entry_id)
            );
        }
        format!(
            "Shiboken::Conversions::isPythonToCppConvertible({}, ",
            self.converter_object_entry(entry_id)
        )
    }

    /// The open-call Python->C++ conversion prefix for a type use.
    pub fn to_cpp_conversion_function(&self, ty: &AbstractType) -> String {
        if self.is_wrapper_type(ty) {
            return format!(
                "Shiboken::Conversions::pythonToCpp{}((SbkObjectType*){}, ",
                if ty.is_pointer() { "Pointer" } else { "Copy" },
                self.py_type_object_ext(ty)
            );
        }
        format!(
            "Shiboken::Conversions::pythonToCppCopy({}, ",
            self.converter_object(ty)
        )
    }

    /// A complete C++->Python conversion expression for `value`.
    pub fn to_python_conversion(&self, ty: &AbstractType, value: &str) -> String {
        if self.is_wrapper_type(ty) {
            let conversion = if ty.is_reference
                && !(self.ts.entry(ty.entry).is_value_type() && ty.is_constant)
                && !ty.is_pointer()
            {
                "reference"
            } else if self.ts.entry(ty.entry).is_value_type() {
                "copy"
            } else {
                "pointer"
            };
            let amp = if conversion == "pointer" { "" } else { "&" };
            return format!(
                "Shiboken::Conversions::{}ToPython((SbkObjectType*){}, {}{})",
                conversion,
                self.py_type_object_ext(ty),
                amp,
                value
            );
        }
        let amp = if self.is_cstring(ty) || self.is_void_pointer(ty) {
            ""
        } else {
            "&"
        };
        format!(
            "Shiboken::Conversions::copyToPython({}, {}{})",
            self.converter_object(ty),
            amp,
            value
        )
    }

    pub fn to_python_conversion_entry(&self, entry_id: TypeEntryId, value: &str) -> String {
        self.to_python_conversion(&AbstractType::plain(entry_id), value)
    }

    /// The implicit conversions feeding a value type, with user-added
    /// functions and suppressed originals filtered out.
    pub fn effective_implicit_conversions(&self, entry_id: TypeEntryId) -> Vec<FunctionId> {
        if let Some(custom) = &self.ts.entry(entry_id).custom_conversion {
            if custom.replace_original_target_to_native {
                return Vec::new();
            }
        }
        self.model
            .implicit_conversions(entry_id)
            .into_iter()
            .filter(|&f| {
                let func = self.model.function(f);
                !func.flags.is_user_added && !func.flags.is_modified_removed
            })
            .collect()
    }

    /// Source type of an implicit conversion function.
    pub fn implicit_source_type(&self, conv: FunctionId) -> AbstractType {
        let func = self.model.function(conv);
        if func.is_conversion_operator() {
            let owner = func.owner_class.expect("conversion operator without owner");
            AbstractType::plain(self.model.class(owner).entry)
        } else {
            func.arguments[0].ty.clone()
        }
    }
}

/// Split template arguments at top-level commas, respecting nesting.
fn split_template_args(inner: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        args.push(last);
    }
    args
}

pub(crate) fn write_python_to_cpp_function(
    w: &mut CppWriter,
    code: &str,
    source_name: &str,
    target_name: &str,
) {
    let ctx_less_name = format!("{}_PythonToCpp_{}", source_name, target_name);
    w.line(&format!(
        "static void {}(PyObject* pyIn, void* cppOut) {{",
        ctx_less_name
    ));
    w.indent();
    w.lines(code);
    w.dedent();
    w.line("}");
}

pub(crate) fn write_cpp_to_python_function(
    w: &mut CppWriter,
    code: &str,
    source_name: &str,
    target_name: &str,
) {
    let target_name = if target_name.is_empty() {
        source_name
    } else {
        target_name
    };
    w.line(&format!(
        "static PyObject* {}_CppToPython_{}(const void* cppIn) {{",
        source_name, target_name
    ));
    w.indent();
    w.lines(code);
    w.dedent();
    w.line("}");
}

pub(crate) fn write_is_convertible_function(
    w: &mut CppWriter,
    source_name: &str,
    target_name: &str,
    condition: &str,
    accept_none_as_null: bool,
) {
    w.line(&format!(
        "static PythonToCppFunc is_{}_PythonToCpp_{}_Convertible(PyObject* pyIn) {{",
        source_name, target_name
    ));
    w.indent();
    if accept_none_as_null {
        w.line("if (pyIn == Py_None)");
        w.indented(|w| w.line("return Shiboken::Conversions::nonePythonToCppNullPtr;"));
    }
    w.line(&format!("if ({})", condition));
    w.indented(|w| {
        w.line(&format!(
            "return {}_PythonToCpp_{};",
            source_name, target_name
        ))
    });
    w.line("return 0;");
    w.dedent();
    w.line("}");
}

pub(crate) fn write_add_python_to_cpp_conversion(
    w: &mut CppWriter,
    converter_var: &str,
    to_cpp: &str,
    is_convertible: &str,
) {
    w.line(&format!(
        "Shiboken::Conversions::addPythonToCppValueConversion({},",
        converter_var
    ));
    w.indented(|w| {
        w.line(&format!("{},", to_cpp));
        w.line(is_convertible);
    });
    w.line(");");
}

/// The converter trio (and implicit conversions) for one wrapper class.
pub(crate) fn write_class_converter_functions(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    class_id: ClassId,
) -> Result<(), GenError> {
    let class = ctx.model.class(class_id);
    if class.is_namespace {
        return Ok(());
    }
    let entry = ctx.ts.entry(class.entry);
    let type_name = format!("::{}", class.qualified_cpp_name);
    let cpython_type = ctx.py_type_name(class);

    w.line("// Type conversion functions.");
    w.blank();

    // Python to C++ pointer conversion, preserving object identity.
    let source_name = class.name.clone();
    let target_name = format!("{}_PTR", class.name);
    write_python_to_cpp_function(
        w,
        &format!(
            "Shiboken::Conversions::pythonToCppPointer(&{}, pyIn, cppOut);",
            cpython_type
        ),
        &source_name,
        &target_name,
    );
    let py_type_check = format!("PyObject_TypeCheck(pyIn, (PyTypeObject*)&{})", cpython_type);
    write_is_convertible_function(w, &source_name, &target_name, &py_type_check, true);
    w.blank();

    // C++ pointer back to the live Python wrapper, keeping identity.
    let mut code = CppWriter::new();
    if ctx.config.enable_pyside_extensions && class.is_qobject {
        code.line(&format!(
            "return PySide::getWrapperForQObject(({}*)cppIn, &{});",
            type_name, cpython_type
        ));
    } else {
        code.line(
            "PyObject* pyOut = (PyObject*)Shiboken::BindingManager::instance().retrieveWrapper(cppIn);",
        );
        code.open_block("if (pyOut)");
        code.line("Py_INCREF(pyOut);");
        code.line("return pyOut;");
        code.close_block("");
        code.line(&format!(
            "const char* typeName = typeid(*(({}*)cppIn)).name();",
            type_name
        ));
        code.line(&format!(
            "return Shiboken::Object::newObject(&{}, const_cast<void*>(cppIn), false, false, typeName);",
            cpython_type
        ));
    }
    write_cpp_to_python_function(w, code.as_str(), &target_name, &source_name);

    if !entry.is_value_type() {
        w.blank();
        return Ok(());
    }

    // Copy conversions exist only for value types.
    w.blank();
    w.line("// C++ to Python copy conversion.");
    let copy_name = format!("{}_COPY", class.name);
    write_cpp_to_python_function(
        w,
        &format!(
            "return Shiboken::Object::newObject(&{}, new ::{}(*(({}*)cppIn)), true, true);",
            cpython_type,
            ctx.effective_class_cpp_name(class_id),
            type_name
        ),
        &copy_name,
        &class.name,
    );
    w.blank();

    w.line("// Python to C++ copy conversion.");
    write_python_to_cpp_function(
        w,
        &format!(
            "*(({}*)cppOut) = *{};",
            type_name,
            ctx.wrapper_cpp_pointer(class.entry, "pyIn")
        ),
        &class.name,
        &copy_name,
    );
    write_is_convertible_function(w, &class.name, &copy_name, &py_type_check, false);
    w.blank();

    // Implicit conversions: one Python->C++ alternative per source.
    let implicit = ctx.effective_implicit_conversions(class.entry);
    if !implicit.is_empty() {
        w.line("// Implicit conversions.");
    }
    let target_type = AbstractType::plain(class.entry);
    for conv in implicit {
        write_implicit_conversion(w, ctx, conv, &target_type)?;
    }

    if let Some(custom) = &entry.custom_conversion {
        write_custom_converter_functions(w, ctx, custom, class.entry)?;
    }
    Ok(())
}

fn write_implicit_conversion(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    conv: FunctionId,
    target_type: &AbstractType,
) -> Result<(), GenError> {
    let func = ctx.model.function(conv);
    let source_type = ctx.implicit_source_type(conv);
    let source_entry = ctx.ts.entry(source_type.entry);

    let mut type_check;
    let mut to_cpp_conv = String::new();
    let mut pre_conv = String::new();

    if func.is_conversion_operator() {
        let owner = func.owner_class.expect("conversion operator without owner");
        let owner_entry = ctx.model.class(owner).entry;
        type_check = format!(
            "PyObject_TypeCheck(pyIn, {})",
            ctx.py_type_object_ext_entry(owner_entry)
        );
        to_cpp_conv = format!("*{}", ctx.wrapper_cpp_pointer(owner_entry, "pyIn"));
    } else {
        // A constructor with a replaced argument type cannot feed the
        // default conversion machinery.
        if func.type_replaced(1).is_some() {
            return Ok(());
        }
        type_check = ctx.check_function(&source_type);
        if ctx.is_wrapper_type(&source_type) {
            type_check = format!("{}pyIn)", type_check);
            let deref = if source_type.is_reference || !ctx.is_pointer_to_wrapper(&source_type) {
                "*"
            } else {
                ""
            };
            to_cpp_conv = format!(
                "{}{}",
                deref,
                ctx.wrapper_cpp_pointer(source_type.entry, "pyIn")
            );
        } else if type_check.contains("%in") {
            type_check = format!("{})", type_check.replace("%in", "pyIn"));
        } else {
            type_check = format!("{}pyIn)", type_check);
        }

        let needs_intermediate = source_entry.is_primitive()
            || source_entry.is_enum()
            || source_entry.is_flags()
            || source_entry.is_container();
        if needs_intermediate {
            let mut pc = CppWriter::new();
            let init = ctx
                .minimal_constructor(&source_type)
                .map(|c| format!(" = {}", c))
                .unwrap_or_default();
            pc.line(&format!(
                "{} cppIn{};",
                source_type.cpp_signature_without_modifiers(ctx.ts),
                init
            ));
            pc.line(&format!(
                "{}pyIn, &cppIn);",
                ctx.to_cpp_conversion_function(&source_type)
            ));
            pre_conv = pc.into_string();
            to_cpp_conv = "cppIn".to_string();
        } else if !ctx.is_wrapper_type(&source_type) {
            to_cpp_conv = format!("{}pyIn", ctx.to_cpp_conversion_function(&source_type));
        }
    }

    write_python_to_cpp_conversion_pair(
        w,
        ctx,
        &source_type,
        target_type,
        &type_check,
        &to_cpp_conv,
        &pre_conv,
    );
    Ok(())
}

/// The Python->C++ function plus its is-convertible companion, built
/// from a check expression and a conversion expression.
fn write_python_to_cpp_conversion_pair(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    source_type: &AbstractType,
    target_type: &AbstractType,
    type_check: &str,
    conversion: &str,
    pre_conversion: &str,
) {
    let conversion = if conversion.is_empty() {
        format!("*{}", ctx.wrapper_cpp_pointer(source_type.entry, "pyIn"))
    } else {
        conversion.to_string()
    };
    let target_cpp = format!(
        "::{}",
        ctx.ts.entry(target_type.entry).qualified_cpp_name
    );
    let mut code = CppWriter::new();
    if !pre_conversion.is_empty() {
        code.lines(pre_conversion);
    }
    code.line(&format!(
        "*(({}*)cppOut) = {}({});",
        target_cpp, target_cpp, conversion
    ));
    let source_name = ctx.fixed_type_name(source_type);
    let target_name = ctx.fixed_type_name(target_type);
    write_python_to_cpp_function(w, code.as_str(), &source_name, &target_name);

    let type_check = if type_check.is_empty() {
        format!(
            "PyObject_TypeCheck(pyIn, {})",
            ctx.py_type_object_ext(source_type)
        )
    } else {
        type_check.to_string()
    };
    write_is_convertible_function(w, &source_name, &target_name, &type_check, false);
    w.blank();
}

pub(crate) fn write_custom_converter_functions(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    custom: &CustomConversion,
    owner: TypeEntryId,
) -> Result<(), GenError> {
    if custom.target_to_native.is_empty() {
        return Ok(());
    }
    w.line(&format!(
        "// Python to C++ conversions for type '{}'.",
        ctx.ts.entry(owner).qualified_cpp_name
    ));
    for to_native in &custom.target_to_native {
        write_custom_target_to_native(w, ctx, to_native, owner)?;
    }
    w.blank();
    Ok(())
}

fn write_custom_target_to_native(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    to_native: &TargetToNativeConversion,
    owner: TypeEntryId,
) -> Result<(), GenError> {
    let owner_entry = ctx.ts.entry(owner);
    let in_type = match to_native.source_type {
        Some(source) => ctx.py_type_object_ext_entry(source),
        None => format!(
            "(&{}_Type)",
            to_native.source_type_name.as_deref().unwrap_or("PyObject")
        ),
    };
    let code = to_native
        .conversion
        .replace("%INTYPE", &in_type)
        .replace("%OUTTYPE", &owner_entry.qualified_cpp_name)
        .replace("%in", "pyIn")
        .replace(
            "%out",
            &format!("*((::{}*)cppOut)", owner_entry.qualified_cpp_name),
        );

    let source_name = match to_native.source_type {
        Some(source) => ctx.fixed_type_name_entry(source, None),
        None => to_native
            .source_type_name
            .clone()
            .unwrap_or_else(|| "PyObject".to_string()),
    };
    let target_name = ctx.fixed_type_name_entry(owner, None);
    write_python_to_cpp_function(w, &code, &source_name, &target_name);

    let type_check = custom_source_type_check(ctx, to_native, owner)?;
    let type_check = type_check.replace("%in", "pyIn");
    write_is_convertible_function(w, &source_name, &target_name, &type_check, false);
    Ok(())
}

fn custom_source_type_check(
    ctx: &EmitCtx,
    to_native: &TargetToNativeConversion,
    owner: TypeEntryId,
) -> Result<String, GenError> {
    if let Some(check) = &to_native.source_type_check {
        return Ok(check.clone());
    }
    if let Some(name) = &to_native.source_type_name {
        let check = match name.as_str() {
            "Py_None" | "PyNone" => "%in == Py_None".to_string(),
            "SbkEnumType" => "Shiboken::isShibokenEnum(%in)".to_string(),
            "SbkObject" => "Shiboken::Object::checkType(%in)".to_string(),
            "PyTypeObject" => "PyType_Check(%in)".to_string(),
            "PyObject" => "PyObject_TypeCheck(%in, &PyBaseObject_Type)".to_string(),
            n if n.starts_with("Py") => format!("{}_Check(%in)", n),
            _ => String::new(),
        };
        if !check.is_empty() {
            return Ok(check);
        }
    }
    match to_native.source_type {
        Some(source) if !ctx.ts.entry(source).is_primitive() => Ok(format!(
            "PyObject_TypeCheck(%in, {})",
            ctx.py_type_object_ext_entry(source)
        )),
        _ => Err(GenError::CustomConversionWithoutCheck(
            ctx.ts.entry(owner).qualified_cpp_name.clone(),
        )),
    }
}

/// Container conversions come from the type-system snippet, with the
/// `%INTYPE_<i>`/`%OUTTYPE_<i>` placeholders resolved per
/// instantiation.
pub(crate) fn write_container_converter_functions(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    container: &AbstractType,
) -> Result<(), GenError> {
    let entry = ctx.ts.entry(container.entry);
    let custom = entry.custom_conversion.as_ref().ok_or_else(|| {
        GenError::ContainerWithoutConversionRule(entry.qualified_cpp_name.clone())
    })?;

    // C++ to Python.
    let cpp_type = format!("::{}", container.cpp_signature_without_modifiers(ctx.ts));
    let mut code = custom.native_to_target.clone();
    for (i, inst) in container.instantiations.iter().enumerate() {
        let inst_name = format!("::{}", inst.cpp_signature(ctx.ts));
        code = code.replace(&format!("%INTYPE_{}", i), &inst_name);
    }
    code = format!("{}& cppInRef = *(({}*)cppIn);\n{}", cpp_type, cpp_type, code)
        .replace("%INTYPE", &cpp_type)
        .replace("%OUTTYPE", "PyObject*")
        .replace("%in", "cppInRef")
        .replace("%out", "pyOut");
    let fixed_name = ctx.fixed_type_name(container);
    write_cpp_to_python_function(w, &code, &fixed_name, "");
    w.blank();

    // Python to C++.
    if custom.target_to_native.is_empty() {
        return Err(GenError::ContainerWithoutConversionRule(
            entry.qualified_cpp_name.clone(),
        ));
    }
    let mut code = format!(
        "{}& cppOutRef = *(({}*)cppOut);\n{}",
        cpp_type, cpp_type, custom.target_to_native[0].conversion
    );
    for (i, inst) in container.instantiations.iter().enumerate() {
        let mut type_name = format!("::{}", inst.cpp_signature(ctx.ts));
        if ctx.ts.entry(inst.entry).is_value_type()
            && ctx.is_value_type_with_copy_ctor_only(inst.entry)
        {
            // Locals of copy-only value types live behind pointers, so
            // rewrite the receiving variables of conversion calls into
            // pointer form.
            code = rewrite_deref_for_copy_only(&code);
            type_name.push('*');
        }
        code = code.replace(&format!("%OUTTYPE_{}", i), &type_name);
    }
    code = code
        .replace("%OUTTYPE", &cpp_type)
        .replace("%in", "pyIn")
        .replace("%out", "cppOutRef");
    write_python_to_cpp_function(w, &code, &fixed_name, &fixed_name);

    let check = ctx.check_function(container);
    let condition = if check.is_empty() {
        "false".to_string()
    } else {
        format!("{}pyIn)", check)
    };
    write_is_convertible_function(w, &fixed_name, &fixed_name, &condition, false);
    w.blank();
    Ok(())
}

fn rewrite_deref_for_copy_only(code: &str) -> String {
    let mut result = code.to_string();
    let mut search_from = 0;
    while let Some(m) = OUT_ASSIGNMENT.captures(&result[search_from..]) {
        let var = m.get(1).expect("capture").as_str().to_string();
        let end = search_from + m.get(0).expect("match").end();
        let (left, right) = result.split_at(end);
        let rewritten = right.replace(&var, &format!("*{}", var));
        result = format!("{}{}", left, rewritten);
        search_from = end;
    }
    result
}

/// Module-init registration for a wrapper class converter.
pub(crate) fn write_converter_register(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    class_id: ClassId,
) -> Result<(), GenError> {
    let class = ctx.model.class(class_id);
    if class.is_namespace {
        return Ok(());
    }
    let entry = ctx.ts.entry(class.entry);
    w.line("// Register Converter");
    w.line(&format!(
        "SbkConverter* converter = Shiboken::Conversions::createConverter(&{},",
        ctx.py_type_name(class)
    ));
    w.indent();
    let source = &class.name;
    let ptr = format!("{}_PTR", class.name);
    w.line(&format!("{},", ctx.python_to_cpp_fn(source, &ptr)));
    w.line(&format!("{},", ctx.is_convertible_fn(source, &ptr)));
    if entry.is_value_type() {
        w.line(&format!("{},", ctx.cpp_to_python_fn(&ptr, source)));
        w.line(&ctx.cpp_to_python_fn(&format!("{}_COPY", class.name), source));
    } else {
        w.line(&ctx.cpp_to_python_fn(&ptr, source));
    }
    w.dedent();
    w.line(");");
    w.blank();

    // Register under every qualified spelling, pointer and reference
    // variants included, plus the typeid name.
    let segments: Vec<&str> = class.qualified_cpp_name.split("::").collect();
    for start in 0..segments.len() {
        let signature = segments[start..].join("::");
        w.line(&format!(
            "Shiboken::Conversions::registerConverterName(converter, \"{}\");",
            signature
        ));
        w.line(&format!(
            "Shiboken::Conversions::registerConverterName(converter, \"{}*\");",
            signature
        ));
        w.line(&format!(
            "Shiboken::Conversions::registerConverterName(converter, \"{}&\");",
            signature
        ));
    }
    w.line(&format!(
        "Shiboken::Conversions::registerConverterName(converter, typeid(::{}).name());",
        class.qualified_cpp_name
    ));
    if ctx.should_generate_cpp_wrapper(class_id) {
        w.line(&format!(
            "Shiboken::Conversions::registerConverterName(converter, typeid(::{}).name());",
            ctx.wrapper_name(class)
        ));
    }
    w.blank();

    if !entry.is_value_type() {
        return Ok(());
    }

    w.line("// Add Python to C++ copy (value, not pointer neither reference) conversion to type converter.");
    let copy = format!("{}_COPY", class.name);
    write_add_python_to_cpp_conversion(
        w,
        "converter",
        &ctx.python_to_cpp_fn(&class.name, &copy),
        &ctx.is_convertible_fn(&class.name, &copy),
    );

    let implicit = ctx.effective_implicit_conversions(class.entry);
    if !implicit.is_empty() {
        w.line("// Add implicit conversions to type converter.");
    }
    let target_type = AbstractType::plain(class.entry);
    for conv in implicit {
        let func = ctx.model.function(conv);
        if !func.is_conversion_operator() && func.type_replaced(1).is_some() {
            continue;
        }
        let source_type = ctx.implicit_source_type(conv);
        let source_name = ctx.fixed_type_name(&source_type);
        let target_name = ctx.fixed_type_name(&target_type);
        write_add_python_to_cpp_conversion(
            w,
            "converter",
            &ctx.python_to_cpp_fn(&source_name, &target_name),
            &ctx.is_convertible_fn(&source_name, &target_name),
        );
    }

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
                let target_name = ctx.fixed_type_name_entry(class.entry, None);
                write_add_python_to_cpp_conversion(
                    w,
                    "converter",
                    &ctx.python_to_cpp_fn(&source_name, &target_name),
                    &ctx.is_convertible_fn(&source_name, &target_name),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_fixtures::ModelBuilder;

    #[test]
    fn value_class_gets_copy_converters() {
        let mut b = ModelBuilder::new();
        let point = b.value_class("Point");
        b.constructor(point, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_class_converter_functions(&mut w, &ctx, point).unwrap();
        let out = w.into_string();
        assert!(out.contains("static void Point_PythonToCpp_Point_PTR(PyObject* pyIn, void* cppOut)"));
        assert!(out.contains("static PyObject* Point_COPY_CppToPython_Point(const void* cppIn)"));
        assert!(out.contains("static PythonToCppFunc is_Point_PythonToCpp_Point_COPY_Convertible"));
    }

    #[test]
    fn object_class_skips_copy_converters() {
        let mut b = ModelBuilder::new();
        let obj = b.object_class("Widget");
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_class_converter_functions(&mut w, &ctx, obj).unwrap();
        let out = w.into_string();
        assert!(out.contains("Widget_PythonToCpp_Widget_PTR"));
        assert!(!out.contains("Widget_COPY"));
    }

    #[test]
    fn implicit_constructor_produces_secondary_conversion() {
        let mut b = ModelBuilder::new();
        let target = b.value_class("Target");
        let int_ty = b.int_ty();
        b.constructor(target, &[("v", int_ty)]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_class_converter_functions(&mut w, &ctx, target).unwrap();
        let out = w.into_string();
        assert!(out.contains("// Implicit conversions."));
        assert!(out.contains("int_PythonToCpp_Target"));
        assert!(out.contains("is_int_PythonToCpp_Target_Convertible"));
    }

    #[test]
    fn registration_registers_all_name_variants() {
        let mut b = ModelBuilder::new();
        let point = b.value_class("Geo::Point");
        b.constructor(point, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_converter_register(&mut w, &ctx, point).unwrap();
        let out = w.into_string();
        for name in ["Geo::Point", "Geo::Point*", "Geo::Point&", "Point", "Point*", "Point&"] {
            assert!(
                out.contains(&format!("registerConverterName(converter, \"{}\");", name)),
                "missing registration for {}",
                name
            );
        }
        assert!(out.contains("typeid(::Geo::Point).name()"));
    }

    #[test]
    fn copy_only_value_type_rewrites_snippet_variables() {
        let code = "Item cppItem = %CONVERTTOCPP[Item](pyItem);\ncppOutRef.push_back(cppItem);";
        let rewritten = rewrite_deref_for_copy_only(code);
        assert!(rewritten.contains("push_back(*cppItem)"));
        assert!(rewritten.starts_with("Item cppItem = %CONVERTTOCPP"));
    }
}

// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Emits the C function Python calls for each exposed function group:
//! argument parsing and named-argument resolution, the overload
//! decisor, per-argument conversion, the C++ call with its
//! allow-threads bracket, return conversion, and ownership/refcount
//! bookkeeping. Also emits the virtual-method trampolines for wrapper
//! subclasses.

use itertools::Itertools;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use sbkgen_model::{AbstractType, Argument, FunctionId, Language, SnipPosition};

use super::overloads::{argument_at, OverloadData, OverloadNode};
use super::snippets::{self, ArgReplacement, SnippetEnv};
use super::EmitCtx;
use crate::errors::GenError;
use crate::writer::CppWriter;

/// Py_BuildValue format unit per primitive name; anything absent is
/// passed as a converted object ('N').
static FORMAT_UNITS: Lazy<HashMap<&'static str, char>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("char", 'b');
    m.insert("unsigned char", 'B');
    m.insert("int", 'i');
    m.insert("unsigned int", 'I');
    m.insert("short", 'h');
    m.insert("unsigned short", 'H');
    m.insert("long", 'l');
    m.insert("unsigned long", 'k');
    m.insert("long long", 'L');
    m.insert("__int64", 'L');
    m.insert("unsigned long long", 'K');
    m.insert("unsigned __int64", 'K');
    m.insert("double", 'd');
    m.insert("float", 'f');
    m
});

impl<'a> EmitCtx<'a> {
    pub fn full_type_name_entry(&self, entry_id: sbkgen_model::TypeEntryId) -> String {
        let entry = self.ts.entry(entry_id);
        if entry.is_cpp_primitive() {
            entry.qualified_cpp_name.clone()
        } else {
            format!("::{}", entry.qualified_cpp_name)
        }
    }

    pub fn full_type_name(&self, ty: &AbstractType) -> String {
        if self.is_cstring(ty) {
            return "const char*".to_string();
        }
        if self.is_void_pointer(ty) {
            return "void*".to_string();
        }
        if self.ts.entry(ty.entry).is_container() {
            return format!("::{}", ty.cpp_signature(self.ts));
        }
        let base = if self.ts.entry(ty.entry).is_complex() && ty.has_instantiations() {
            self.full_type_name_without_modifiers(ty)
        } else {
            self.full_type_name_entry(ty.entry)
        };
        format!("{}{}", base, "*".repeat(ty.indirections as usize))
    }

    pub fn full_type_name_without_modifiers(&self, ty: &AbstractType) -> String {
        if self.is_cstring(ty) {
            return "const char*".to_string();
        }
        if self.is_void_pointer(ty) {
            return "void*".to_string();
        }
        if !ty.has_instantiations() {
            return self.full_type_name_entry(ty.entry);
        }
        let mut name = ty.cpp_signature(self.ts);
        if let Some(stripped) = name.strip_prefix("const ") {
            name = stripped.to_string();
        }
        while name.ends_with('&') || name.ends_with('*') || name.ends_with(' ') {
            name.pop();
        }
        format!("::{}", name)
    }
}

/// `pythonToCpp` or `pythonToCpp[N]`, matching the argument slot name.
fn python_to_cpp_var_for(arg_name: &str) -> String {
    match arg_name.find('[') {
        Some(open) => format!("pythonToCpp{}", &arg_name[open..]),
        None => "pythonToCpp".to_string(),
    }
}

fn py_arg_at(use_py_args: bool, pos: usize) -> String {
    if use_py_args {
        format!("pyArgs[{}]", pos)
    } else {
        "pyArg".to_string()
    }
}

/// One type test in the decisor: check-or-save-converter expression.
fn type_check_expression(
    ctx: &EmitCtx,
    arg_type: &AbstractType,
    arg_name: &str,
    is_number: bool,
    custom_type: Option<&str>,
) -> String {
    let mut arg_type = arg_type.clone();
    let mut custom_check = None;
    if let Some(custom) = custom_type {
        let (check, parsed) = ctx.guess_check_function(custom);
        custom_check = check;
        if let Some(parsed) = parsed {
            arg_type = parsed;
        }
    }

    let mut type_check = match &custom_check {
        Some(check) => format!("{}({})", check, arg_name),
        None => format!("{}({})", ctx.is_convertible_function(&arg_type), arg_name),
    };

    if custom_check.is_none() && !ctx.ts.entry(arg_type.entry).is_custom() {
        type_check = format!(
            "({} = {}))",
            python_to_cpp_var_for(arg_name),
            type_check
        );
        if !is_number && ctx.ts.entry(arg_type.entry).is_cpp_primitive() {
            type_check = format!(
                "{}({}) && {}",
                ctx.check_function(&arg_type),
                arg_name,
                type_check
            );
        }
    }
    type_check
}

/// The check for one trie node, with the number-genericity decision
/// taken from the sibling set: one numeric sibling means the check may
/// accept any number.
fn node_type_check(
    ctx: &EmitCtx,
    siblings: &[OverloadNode],
    node: &OverloadNode,
    arg_name: &str,
) -> String {
    let mut numeric_entries = indexmap::IndexSet::new();
    for sibling in siblings {
        for &fid in &sibling.overloads {
            if let Some(arg) = argument_at(ctx, fid, sibling.arg_pos as usize) {
                if ctx.ts.entry(arg.ty.entry).is_primitive()
                    && ctx.is_number_entry(arg.ty.entry)
                {
                    numeric_entries.insert(arg.ty.entry);
                }
            }
        }
    }
    let arg_type = node.arg_type.as_ref().expect("non-root node");
    let is_number = numeric_entries.len() == 1 || ctx.is_py_int(arg_type);
    let is_number = is_number && !ctx.ts.entry(arg_type.entry).is_enum();
    type_check_expression(
        ctx,
        arg_type,
        arg_name,
        is_number,
        node.arg_type_replaced.as_deref(),
    )
}

/// Emit the `static PyObject* ...` wrapper for a method/function group.
pub(crate) fn write_method_wrapper(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    overloads: &[FunctionId],
) -> Result<(), GenError> {
    let data = OverloadData::new(ctx, overloads);
    let rfunc = ctx.model.function(data.reference_function());
    let max_args = data.max_args;
    let use_py_args = data.uses_py_args(ctx);
    let ec = "0";

    let mut signature = format!(
        "static PyObject* {}(PyObject* self",
        ctx.cpython_function_name(rfunc)
    );
    if max_args > 0 {
        signature.push_str(&format!(
            ", PyObject* {}",
            if use_py_args { "args" } else { "pyArg" }
        ));
        if data.has_argument_with_default_value(ctx) || rfunc.is_call_operator() {
            signature.push_str(", PyObject* kwds");
        }
    }
    signature.push(')');
    w.line(&signature);
    w.line("{");
    w.indent();

    write_method_wrapper_preamble(w, ctx, &data, ec);
    w.blank();

    let has_return_value = data.has_non_void_return_type(ctx);
    let call_extended_reverse = has_return_value
        && !rfunc.is_inplace_operator()
        && !rfunc.is_call_operator()
        && rfunc.is_operator_overload();
    if call_extended_reverse {
        write_extended_reverse_operator_call(w, ctx, &data);
    }

    if max_args > 0 {
        write_decisor(w, ctx, &data, ec);
    }
    write_function_calls(w, ctx, &data, ec)?;

    if call_extended_reverse {
        w.blank();
        w.line("} // End of \"if (!pyResult)\"");
    }
    w.blank();

    // Error propagation after the call.
    let check_result = has_return_value && !rfunc.is_inplace_operator();
    w.open_block(&format!(
        "if (PyErr_Occurred(){})",
        if check_result { " || !pyResult" } else { "" }
    ));
    if check_result {
        w.line("Py_XDECREF(pyResult);");
    }
    w.line(&format!("return {};", ec));
    w.close_block("");

    if has_return_value {
        if rfunc.is_inplace_operator() {
            w.line("Py_INCREF(self);");
            w.line("return self;");
        } else {
            w.line("return pyResult;");
        }
    } else {
        w.line("Py_RETURN_NONE;");
    }

    if max_args > 0 {
        write_error_section(w, ctx, &data, ec);
    }
    w.dedent();
    w.assert_gil_balanced();
    w.line("}");
    w.blank();
    Ok(())
}

/// Emit the `static int Sbk<Class>_Init` constructor wrapper.
pub(crate) fn write_constructor_wrapper(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    overloads: &[FunctionId],
) -> Result<(), GenError> {
    let data = OverloadData::new(ctx, overloads);
    let rfunc = ctx.model.function(data.reference_function());
    let owner = rfunc.owner_class.expect("constructor without owner");
    let class = ctx.model.class(owner);
    let ec = "-1";

    w.line("static int");
    w.line(&format!(
        "{}(PyObject* self, PyObject* args, PyObject* kwds)",
        ctx.cpython_function_name(rfunc)
    ));
    w.line("{");
    w.indent();

    w.line("SbkObject* sbkSelf = reinterpret_cast<SbkObject*>(self);");
    if class.is_abstract || class.base_classes.len() > 1 {
        w.line("SbkObjectType* type = reinterpret_cast<SbkObjectType*>(self->ob_type);");
        w.line(&format!(
            "SbkObjectType* myType = reinterpret_cast<SbkObjectType*>({});",
            ctx.py_type_object_ext_entry(class.entry)
        ));
    }
    if class.is_abstract {
        w.open_block("if (type == myType)");
        w.line("PyErr_SetString(PyExc_NotImplementedError,");
        w.indented(|w| {
            w.line(&format!(
                "\"'{}' represents a C++ abstract class and cannot be instantiated\");",
                class.qualified_cpp_name
            ))
        });
        w.line(&format!("return {};", ec));
        w.close_block("");
        w.blank();
    }
    if class.base_classes.len() > 1 {
        if !class.is_abstract {
            w.open_block("if (type != myType)");
        } else {
            w.indent();
        }
        w.line("Shiboken::ObjectType::copyMultipleInheritance(type, myType);");
        if !class.is_abstract {
            w.close_block("");
        } else {
            w.dedent();
        }
        w.blank();
    }

    write_method_wrapper_preamble(w, ctx, &data, ec);
    w.blank();

    if data.max_args > 0 {
        write_decisor(w, ctx, &data, ec);
    }
    write_function_calls(w, ctx, &data, ec)?;
    w.blank();

    w.open_block(&format!(
        "if (PyErr_Occurred() || !Shiboken::Object::setCppPointer(sbkSelf, Shiboken::SbkType< ::{} >(), cptr))",
        class.qualified_cpp_name
    ));
    w.line("delete cptr;");
    w.line(&format!("return {};", ec));
    w.close_block("");
    if data.max_args > 0 {
        w.line(&format!(
            "if (!cptr) goto {}_TypeError;",
            ctx.cpython_function_name(rfunc)
        ));
        w.blank();
    }

    w.line("Shiboken::Object::setValidCpp(sbkSelf, true);");
    if ctx.should_generate_cpp_wrapper(owner) {
        w.line("Shiboken::Object::setHasCppWrapper(sbkSelf, true);");
    }
    w.line("Shiboken::BindingManager::instance().registerWrapper(sbkSelf, cptr);");

    if class.is_qobject && ctx.config.enable_pyside_extensions {
        w.blank();
        w.line("// QObject setup");
        w.line("PySide::Signal::updateSourceObject(self);");
    }

    // Constructor end-position injected snippets run after registration.
    for &fid in data.overloads() {
        let func = ctx.model.function(fid);
        let end_snips: Vec<_> = func
            .modifications
            .snips(SnipPosition::End, Language::Target)
            .collect();
        if end_snips.is_empty() {
            continue;
        }
        w.open_block(&format!(
            "if (overloadId == {})",
            data.function_number(fid)
        ));
        let env = build_snippet_env(ctx, fid, &data, Language::Target, None, ec);
        for snip in end_snips {
            snippets::write_snippet(w, ctx, &env, &snip.code)?;
        }
        w.close_block("");
    }

    w.blank();
    w.line("return 1;");
    if data.max_args > 0 {
        write_error_section(w, ctx, &data, ec);
    }
    w.dedent();
    w.assert_gil_balanced();
    w.line("}");
    w.blank();
    Ok(())
}

fn write_method_wrapper_preamble(w: &mut CppWriter, ctx: &EmitCtx, data: &OverloadData, ec: &str) {
    let rfunc = ctx.model.function(data.reference_function());
    let use_py_args = data.uses_py_args(ctx);
    let init_python_args;
    let uses_named_args;

    if rfunc.flags.is_constructor {
        let owner = rfunc.owner_class.expect("constructor without owner");
        let class = ctx.model.class(owner);
        if !class.has_private_destructor {
            w.line(&format!(
                "if (Shiboken::Object::isUserType(self) && !Shiboken::ObjectType::canCallConstructor(self->ob_type, Shiboken::SbkType< ::{} >()))",
                class.qualified_cpp_name
            ));
            w.indented(|w| w.line(&format!("return {};", ec)));
            w.blank();
        }
        w.line(&format!("::{}* cptr = 0;", ctx.effective_class_cpp_name(owner)));
        init_python_args = data.max_args > 0;
        uses_named_args = !class.is_qobject && data.has_argument_with_default_value(ctx);
    } else {
        if rfunc.implementing_class.is_some() && data.has_instance_function(ctx) {
            write_cpp_self_definition(w, ctx, data, ec);
        }
        if !rfunc.is_inplace_operator() && data.has_non_void_return_type(ctx) {
            w.line("PyObject* pyResult = 0;");
        }
        init_python_args = data.min_args != data.max_args || data.max_args > 1;
        uses_named_args = rfunc.is_call_operator() || data.has_argument_with_default_value(ctx);
    }

    if data.max_args > 0 {
        w.line("int overloadId = -1;");
        if use_py_args {
            let zeros = std::iter::repeat("0").take(data.max_args).join(", ");
            w.line(&format!("PythonToCppFunc pythonToCpp[] = {{ {} }};", zeros));
        } else {
            w.line("PythonToCppFunc pythonToCpp;");
        }
    }

    if uses_named_args && !rfunc.is_call_operator() {
        w.line("int numNamedArgs = (kwds ? PyDict_Size(kwds) : 0);");
    }

    if init_python_args {
        if data.min_args == 0
            && data.max_args == 1
            && !rfunc.flags.is_constructor
            && !use_py_args
        {
            w.line("int numArgs = (pyArg == 0 ? 0 : 1);");
        } else {
            write_arguments_initializer(w, ctx, data, ec, uses_named_args);
        }
    }
}

fn write_arguments_initializer(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    ec: &str,
    uses_named_args: bool,
) {
    let rfunc = ctx.model.function(data.reference_function());
    w.line("int numArgs = PyTuple_GET_SIZE(args);");
    let zeros = std::iter::repeat("0").take(data.max_args).join(", ");
    w.line(&format!("PyObject* pyArgs[] = {{{}}};", zeros));
    w.blank();

    w.line("// invalid argument lengths");
    if uses_named_args {
        w.open_block(&format!(
            "if (numArgs + numNamedArgs > {})",
            data.max_args
        ));
        w.line(&format!(
            "PyErr_SetString(PyExc_TypeError, \"{}(): too many arguments\");",
            ctx.full_python_function_name(rfunc)
        ));
        w.line(&format!("return {};", ec));
        w.close_block("");
        if data.min_args > 0 {
            w.open_block(&format!("if (numArgs < {})", data.min_args));
            w.line(&format!(
                "PyErr_SetString(PyExc_TypeError, \"{}(): not enough arguments\");",
                ctx.full_python_function_name(rfunc)
            ));
            w.line(&format!("return {};", ec));
            w.close_block("");
        }
    }
    let invalid = data.invalid_argument_lengths(ctx);
    if !invalid.is_empty() {
        let tests = invalid.iter().map(|n| format!("numArgs == {}", n)).join(" || ");
        w.line(&format!("if ({})", tests));
        w.indented(|w| {
            w.line(&format!(
                "goto {}_TypeError;",
                ctx.cpython_function_name(rfunc)
            ))
        });
    }
    w.blank();

    let func_name = if rfunc.is_operator_overload() {
        ctx.python_operator_function_name(rfunc)
    } else {
        rfunc.name.clone()
    };
    let arg_refs = (0..data.max_args)
        .map(|i| format!("&(pyArgs[{}])", i))
        .join(", ");
    if uses_named_args {
        w.line(&format!(
            "if (!PyArg_ParseTuple(args, \"|{}:{}\", {}))",
            "O".repeat(data.max_args),
            func_name,
            arg_refs
        ));
    } else {
        w.line(&format!(
            "if (!PyArg_UnpackTuple(args, \"{}\", {}, {}, {}))",
            func_name, data.min_args, data.max_args, arg_refs
        ));
    }
    w.indented(|w| w.line(&format!("return {};", ec)));
    w.blank();
}

fn write_cpp_self_definition(w: &mut CppWriter, ctx: &EmitCtx, data: &OverloadData, ec: &str) {
    let rfunc = ctx.model.function(data.reference_function());
    let Some(owner) = rfunc.owner_class else {
        return;
    };
    let class = ctx.model.class(owner);

    if rfunc.is_operator_overload() && rfunc.is_binary_operator() {
        let check = ctx.check_function_entry(class.entry);
        w.line(&format!("bool isReverse = {}pyArg)", check));
        w.indented(|w| w.line(&format!("&& !{}self);", check)));
        w.line("if (isReverse)");
        w.indented(|w| w.line("std::swap(self, pyArg);"));
    }

    let use_wrapper_class = ctx.config.avoid_protected_hack
        && (class.has_protected_fields()
            || class
                .functions
                .iter()
                .any(|&f| ctx.model.function(f).flags.is_protected));
    let class_name = if use_wrapper_class {
        format!("::{}", ctx.wrapper_name(class))
    } else {
        format!("::{}", class.qualified_cpp_name)
    };
    let cast = if use_wrapper_class {
        format!("({}*)", class_name)
    } else {
        String::new()
    };
    let attribution = format!(
        "cppSelf = {}{}",
        cast,
        ctx.wrapper_cpp_pointer(class.entry, "self")
    );

    w.line(&format!("{}* cppSelf = 0;", class_name));
    if data.has_static_function(ctx) {
        w.open_block("if (self)");
        w.line("if (!Shiboken::Object::isValid(self))");
        w.indented(|w| w.line(&format!("return {};", ec)));
        w.line(&format!("{};", attribution));
        w.close_block("");
        return;
    }
    w.line("if (!Shiboken::Object::isValid(self))");
    w.indented(|w| w.line(&format!("return {};", ec)));
    w.line(&format!("{};", attribution));
}

fn write_extended_reverse_operator_call(w: &mut CppWriter, ctx: &EmitCtx, data: &OverloadData) {
    let rfunc = ctx.model.function(data.reference_function());
    let mut rev_name = ctx.python_operator_function_name(rfunc);
    if !rfunc.is_reverse_operator() {
        // A reverse operator already carries the `r` in its own name.
        rev_name.insert(2, 'r');
    }
    if rfunc.is_binary_operator() {
        w.line("if (!isReverse");
        w.indent();
        w.line("&& Shiboken::Object::checkType(pyArg)");
        w.line("&& !PyObject_TypeCheck(pyArg, self->ob_type)");
        w.open_block(&format!(
            "&& PyObject_HasAttrString(pyArg, const_cast<char*>(\"{}\")))",
            rev_name
        ));
        w.line(&format!(
            "PyObject* revOpMethod = PyObject_GetAttrString(pyArg, const_cast<char*>(\"{}\"));",
            rev_name
        ));
        w.open_block("if (revOpMethod && PyCallable_Check(revOpMethod))");
        w.line("pyResult = PyObject_CallFunction(revOpMethod, const_cast<char*>(\"O\"), self);");
        w.open_block(
            "if (PyErr_Occurred() && (PyErr_ExceptionMatches(PyExc_NotImplementedError) || PyErr_ExceptionMatches(PyExc_AttributeError)))",
        );
        w.line("PyErr_Clear();");
        w.line("Py_XDECREF(pyResult);");
        w.line("pyResult = 0;");
        w.close_block("");
        w.close_block("");
        w.line("Py_XDECREF(revOpMethod);");
        w.close_block("");
        w.dedent();
    }
    w.line("// Do not enter here if other object has implemented a reverse operator.");
    // The matching close is written by the caller once dispatch and the
    // call are done.
    w.line("if (!pyResult) {");
    w.blank();
}

fn write_error_section(w: &mut CppWriter, ctx: &EmitCtx, data: &OverloadData, ec: &str) {
    let rfunc = ctx.model.function(data.reference_function());
    w.blank();
    w.line(&format!("{}_TypeError:", ctx.cpython_function_name(rfunc)));
    w.indent();
    let args_var = if data.uses_py_args(ctx) { "args" } else { "pyArg" };
    let func_name = ctx.full_python_function_name(rfunc);
    if ctx.config.disable_verbose_error_messages {
        w.line(&format!(
            "Shiboken::setErrorAboutWrongArguments({}, \"{}\", 0);",
            args_var, func_name
        ));
    } else {
        let signatures = data
            .overloads()
            .iter()
            .map(|&fid| format!("\"{}\"", overload_signature_hint(ctx, fid)))
            .join(", ");
        w.line(&format!("const char* overloads[] = {{{}, 0}};", signatures));
        w.line(&format!(
            "Shiboken::setErrorAboutWrongArguments({}, \"{}\", overloads);",
            args_var, func_name
        ));
    }
    w.line(&format!("return {};", ec));
    w.dedent();
}

/// Human-readable argument list for the TypeError message.
fn overload_signature_hint(ctx: &EmitCtx, fid: FunctionId) -> String {
    let func = ctx.model.function(fid);
    func.arguments
        .iter()
        .map(|arg| {
            let entry = ctx.ts.entry(ctx.ts.basic_aliased_entry(arg.ty.entry));
            let mut hint = if ctx.is_cstring(&arg.ty) {
                "str".to_string()
            } else if entry.is_primitive() {
                let name = entry.name().trim_start_matches("signed ").to_string();
                if name == "double" {
                    "float".to_string()
                } else {
                    name
                }
            } else {
                entry.target_lang_name.clone()
            };
            if let Some(default) = arg.effective_default() {
                let shown = if (ctx.is_cstring(&arg.ty) || ctx.is_pointer_to_wrapper(&arg.ty))
                    && default == "0"
                {
                    "None".to_string()
                } else {
                    default.replace("::", ".").replace('"', "\\\"")
                };
                hint = format!("{} = {}", hint, shown);
            }
            hint
        })
        .join(", ")
}

/// The overload decisor: a nested if-chain over the trie that stores a
/// non-negative overload id or jumps to the TypeError label.
pub(crate) fn write_decisor(w: &mut CppWriter, ctx: &EmitCtx, data: &OverloadData, ec: &str) {
    let rfunc = ctx.model.function(data.reference_function());
    w.line("// Overloaded function decisor");
    for &fid in &data.overloads_without_repetition(ctx) {
        w.line(&format!(
            "// {}: {}",
            data.function_number(fid),
            ctx.model.function(fid).minimal_signature
        ));
    }
    write_decisor_engine(w, ctx, data, &data.root);
    w.blank();

    if rfunc.is_operator_overload() && !rfunc.is_call_operator() {
        w.open_block("if (isReverse && overloadId == -1)");
        w.line("PyErr_SetString(PyExc_NotImplementedError, \"reverse operator not implemented.\");");
        w.line(&format!("return {};", ec));
        w.close_block("");
        w.blank();
    }

    w.line("// Function signature not found.");
    w.line(&format!(
        "if (overloadId == -1) goto {}_TypeError;",
        ctx.cpython_function_name(rfunc)
    ));
    w.blank();
}

fn write_decisor_engine(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    parent: &OverloadNode,
) {
    let mut has_default_call = parent.next_argument_has_default_value(ctx);
    let mut reference_function = parent.overloads.first().copied().or_else(|| {
        data.overloads().first().copied()
    });

    // A function whose signature ends here can be selected by arity
    // alone even without defaulted arguments downstream.
    if !has_default_call {
        for &fid in &parent.overloads {
            if parent.is_final_occurrence(fid) {
                reference_function = Some(fid);
                has_default_call = true;
                break;
            }
        }
    }

    let use_py_args = data.uses_py_args(ctx);

    if data.max_args == 0 {
        let func = reference_function.expect("overload group is never empty");
        w.line(&format!(
            "overloadId = {}; // {}",
            data.function_number(func),
            ctx.model.function(func).minimal_signature
        ));
        return;
    }

    if parent.arg_pos >= 0 {
        let is_last_argument = parent.children.is_empty();
        let signature_found = parent.overloads.len() == 1;
        if is_last_argument || (signature_found && !has_default_call) {
            let func = parent.overloads[0];
            w.line(&format!(
                "overloadId = {}; // {}",
                data.function_number(func),
                ctx.model.function(func).minimal_signature
            ));
            return;
        }
    }

    // The branches form one if/else-if chain; a branch opens with
    // `if (...)` when first and `} else if (...)` afterwards.
    let mut chain_open = false;
    let mut open_branch = |w: &mut CppWriter, condition: &str, chain_open: &mut bool| {
        if *chain_open {
            w.dedent();
            w.line(&format!("}} else if ({}) {{", condition));
            w.indent();
        } else {
            w.open_block(&format!("if ({})", condition));
            *chain_open = true;
        }
    };

    if has_default_call {
        let num_args = parent.arg_pos + 1;
        let mut func = reference_function.expect("overload group is never empty");
        for child in &parent.children {
            if let Some(def) = child.function_with_default_value(ctx) {
                func = def;
                break;
            }
        }
        open_branch(w, &format!("numArgs == {}", num_args), &mut chain_open);
        w.line(&format!(
            "overloadId = {}; // {}",
            data.function_number(func),
            ctx.model.function(func).minimal_signature
        ));
    }

    for child in parent.children.iter() {
        let signature_found = child.overloads.len() == 1
            && child.function_with_default_value(ctx).is_none()
            && child.find_next_arg_with_default(ctx).is_none();
        let ref_func = child.overloads[0];

        let mut type_checks: Vec<String> = Vec::new();
        let start_arg = child.arg_pos as usize;
        let mut sequence_arg_count = 0;

        // Follow runs of single-alternative children so consecutive
        // argument checks join into one condition.
        let mut current = child;
        let mut current_siblings: &[OverloadNode] = &parent.children;
        loop {
            let replaced_by_pyobject =
                current.arg_type_replaced.as_deref() == Some("PyObject");
            if !replaced_by_pyobject {
                let pos = current.arg_pos as usize;
                let arg_name = if use_py_args {
                    format!("pyArgs[{}]", pos)
                } else {
                    "pyArg".to_string()
                };
                type_checks.push(node_type_check(ctx, current_siblings, current, &arg_name));
            }
            sequence_arg_count += 1;

            let stop = current.children.is_empty()
                || current.next_argument_has_default_value(ctx)
                || current.children.len() != 1
                || current.overloads.len() != current.children[0].overloads.len();
            if stop {
                break;
            }
            current_siblings = &current.children;
            current = &current.children[0];
        }

        if use_py_args && signature_found {
            let num_args = ctx.model.function(ref_func).visible_argument_count();
            type_checks.insert(0, format!("numArgs == {}", num_args));
        } else if sequence_arg_count > 1 {
            type_checks.insert(0, format!("numArgs >= {}", start_arg + sequence_arg_count));
        } else {
            let rf = ctx.model.function(ref_func);
            if rf.is_operator_overload() && !rf.is_call_operator() {
                type_checks.insert(
                    0,
                    if rf.is_reverse_operator() {
                        "isReverse".to_string()
                    } else {
                        "!isReverse".to_string()
                    },
                );
            }
        }

        let condition = if type_checks.is_empty() {
            "true".to_string()
        } else {
            type_checks.join("\n        && ")
        };
        open_branch(w, &condition, &mut chain_open);
        write_decisor_engine(w, ctx, data, current);
    }
    if chain_open {
        w.close_block("");
    }
}

/// The switch running the selected overload.
pub(crate) fn write_function_calls(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    ec: &str,
) -> Result<(), GenError> {
    let overloads = data.overloads_without_repetition(ctx);
    w.line("// Call function/method");
    if overloads.len() == 1 {
        w.open_block("");
        write_single_function_call(w, ctx, data, overloads[0], ec)?;
        w.close_block("");
    } else {
        w.open_block("switch (overloadId)");
        for &fid in &overloads {
            w.line(&format!(
                "case {}: // {}",
                data.function_number(fid),
                ctx.model.function(fid).minimal_signature
            ));
            w.open_block("");
            write_single_function_call(w, ctx, data, fid, ec)?;
            w.line("break;");
            w.close_block("");
        }
        w.close_block("");
    }
    Ok(())
}

fn write_single_function_call(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    fid: FunctionId,
    ec: &str,
) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    if func.flags.is_deprecated {
        w.line(&format!(
            "Shiboken::warning(PyExc_DeprecationWarning, 1, \"Function: '{}' is marked as deprecated, please check the documentation for more information.\");",
            func.minimal_signature.replace("::", ".")
        ));
    }

    let use_py_args = data.uses_py_args(ctx);
    write_named_argument_resolution(w, ctx, data, fid, ec)?;

    // Convert each non-removed argument ahead of the call.
    let mut removed = 0usize;
    for (idx, arg) in func.arguments.iter().enumerate() {
        let ts_index = idx + 1;
        if func.argument_removed(ts_index) {
            if let Some(default) = arg.effective_default() {
                w.line(&format!(
                    "{} removed_cppArg{} = {};",
                    ctx.full_type_name(&arg.ty),
                    idx,
                    default
                ));
            } else if !func.flags.is_user_added
                && !func.injected_code_calls_cpp_function()
                && !func
                    .modifications
                    .has_conversion_rule(Language::Native, ts_index)
            {
                return Err(GenError::RemovedArgumentUncovered {
                    signature: func.minimal_signature.clone(),
                    index: ts_index,
                });
            }
            removed += 1;
            continue;
        }
        if func
            .modifications
            .has_conversion_rule(Language::Native, ts_index)
        {
            continue;
        }
        let arg_pos = idx - removed;
        let arg_type = match func.type_replaced(ts_index) {
            Some(replaced) => match ctx.parse_type_string(replaced) {
                Some(ty) => ty,
                None => {
                    ctx.diags.warn(format!(
                        "Unknown type '{}' used as argument type replacement in function '{}', the generated code may be broken.",
                        replaced, func.minimal_signature
                    ));
                    continue;
                }
            },
            None => arg.ty.clone(),
        };
        if ctx.ts.entry(arg_type.entry).is_custom() {
            continue;
        }
        let py_arg_name = py_arg_at(use_py_args, arg_pos);
        if ctx.is_wrapper_type(&arg_type) {
            w.line(&format!(
                "if (!Shiboken::Object::isValid({}))",
                py_arg_name
            ));
            w.indented(|w| w.line(&format!("return {};", ec)));
        }
        let default = arg.effective_default().map(str::to_string);
        write_python_to_cpp_type_conversion(
            w,
            ctx,
            &arg_type,
            &py_arg_name,
            &format!("cppArg{}", arg_pos),
            default.as_deref(),
        );
    }
    w.blank();

    w.open_block("if (!PyErr_Occurred())");
    write_method_call(w, ctx, data, fid, ec)?;
    if !func.flags.is_constructor {
        // Void calls still hand a None back to Python.
        if data.has_non_void_return_type(ctx)
            && (func.return_type.is_none() || func.argument_removed(0))
        {
            w.line("pyResult = Py_None;");
            w.line("Py_INCREF(Py_None);");
        }
    }
    w.close_block("");
    Ok(())
}

/// Conversion-rule snippets replace the default converter call for one
/// argument; `%in` binds the Python slot and `%out` the generated local.
fn write_conversion_rule(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    fid: FunctionId,
    language: Language,
    ec: &str,
) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    let use_py_args = data.uses_py_args(ctx);
    let mut removed = 0usize;
    for (idx, arg) in func.arguments.iter().enumerate() {
        let ts_index = idx + 1;
        if func.argument_removed(ts_index) {
            removed += 1;
        }
        let Some(rule) = func.conversion_rule(language, ts_index) else {
            continue;
        };
        let mut env = build_snippet_env(ctx, fid, data, Language::Target, None, ec);
        env.in_var = Some(if func.argument_removed(ts_index) {
            py_arg_at(use_py_args, 0)
        } else {
            py_arg_at(use_py_args, idx - removed)
        });
        env.out_var = Some(format!("{}_out", arg.name));
        let expanded = snippets::expand(ctx, &env, rule)?;
        w.lines(&expanded);
    }
    Ok(())
}

/// Declare the C++ local for one argument and materialise it through
/// the converter pointer saved by the decisor.
fn write_python_to_cpp_type_conversion(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    ty: &AbstractType,
    py_in: &str,
    cpp_out: &str,
    default_value: Option<&str>,
) {
    let entry = ctx.ts.entry(ty.entry);
    if entry.is_custom() {
        return;
    }
    let cpp_out_aux = format!("{}_local", cpp_out);

    let treat_as_pointer = ctx.is_value_type_with_copy_ctor_only(ty.entry);
    let is_pointer_or_object = (entry.is_object_type() || ty.is_pointer())
        && !matches!(
            entry.kind,
            sbkgen_model::TypeEntryKind::Primitive { .. }
        );
    let not_container_enum_flags =
        !entry.is_container() && !entry.is_enum() && !entry.is_flags();
    let may_have_implicit_conversion = ty.is_reference
        && entry.is_complex()
        && not_container_enum_flags
        && !(treat_as_pointer || is_pointer_or_object);
    let type_name = ctx.full_type_name_without_modifiers(ty);

    if may_have_implicit_conversion {
        let init = ctx
            .minimal_constructor(ty)
            .map(|c| format!(" = {}", c))
            .unwrap_or_default();
        w.line(&format!("{} {}{};", type_name, cpp_out_aux, init));
    }

    if treat_as_pointer || is_pointer_or_object {
        let init = default_value.map(|d| format!(" = {}", d)).unwrap_or_default();
        w.line(&format!("{}* {}{};", type_name, cpp_out, init));
    } else if ty.is_reference && !entry.is_primitive() && not_container_enum_flags {
        w.line(&format!("{}* {} = &{};", type_name, cpp_out, cpp_out_aux));
    } else {
        let init = match default_value {
            Some(d) => Some(format!(" = {}", d)),
            None if entry.is_container() => Some(String::new()),
            None => ctx.minimal_constructor(ty).map(|c| format!(" = {}", c)),
        };
        match init {
            Some(init) => w.line(&format!("{} {}{};", type_name, cpp_out, init)),
            None => {
                // Without a minimal constructor the local cannot be
                // declared; fail the build of the generated code.
                let msg = format!(
                    "Could not find a minimal constructor for type '{}'. This will result in a compilation error.",
                    ty.cpp_signature(ctx.ts)
                );
                ctx.diags.warn(msg.clone());
                w.line(&format!("{} {};", type_name, cpp_out));
                w.line(&format!("#error {}", msg));
            }
        }
    }

    let converter_var = python_to_cpp_var_for(py_in);
    let call = format!("{}({}, &{});", converter_var, py_in, cpp_out);
    if !may_have_implicit_conversion {
        if default_value.is_some() {
            w.line(&format!("if ({}) {}", converter_var, call));
        } else {
            w.line(&call);
        }
        return;
    }

    if default_value.is_some() {
        w.open_block(&format!("if ({})", converter_var));
    }
    w.line(&format!(
        "if (Shiboken::Conversions::isImplicitConversion((SbkObjectType*){}, {}))",
        ctx.py_type_object_ext(ty),
        converter_var
    ));
    w.indented(|w| w.line(&format!("{}({}, &{});", converter_var, py_in, cpp_out_aux)));
    w.line("else");
    w.indented(|w| w.line(&call));
    if default_value.is_some() {
        w.close_block("");
    }
}

/// Keyword arguments are resolved slot by slot before dispatch; a name
/// that also arrived positionally is an error, call operators take no
/// keywords at all.
fn write_named_argument_resolution(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    fid: FunctionId,
    ec: &str,
) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    if func.is_call_operator() {
        w.open_block("if (kwds && PyDict_Size(kwds) > 0)");
        w.line(&format!(
            "PyErr_SetString(PyExc_TypeError, \"{}(): keyword arguments are not supported on call operators.\");",
            ctx.full_python_function_name(func)
        ));
        w.line(&format!("return {};", ec));
        w.close_block("");
        return Ok(());
    }
    let defaulted: Vec<(usize, &Argument)> = func
        .visible_arguments()
        .filter(|(i, arg)| !func.argument_removed(i + 1) && arg.has_default_value())
        .collect();
    if defaulted.is_empty() {
        return Ok(());
    }
    let use_py_args = data.uses_py_args(ctx);

    w.open_block("if (kwds)");
    w.line("PyObject* value;");
    for (orig_idx, arg) in defaulted {
        let py_pos = orig_idx - func.removed_arguments_before(orig_idx);
        let py_arg_name = py_arg_at(use_py_args, py_pos);
        w.line(&format!(
            "value = PyDict_GetItemString(kwds, \"{}\");",
            arg.name
        ));
        w.open_block(&format!("if (value && {})", py_arg_name));
        w.line(&format!(
            "PyErr_SetString(PyExc_TypeError, \"{}(): got multiple values for keyword argument '{}'.\");",
            ctx.full_python_function_name(func),
            arg.name
        ));
        w.line(&format!("return {};", ec));
        w.close_block("");
        w.open_block("else if (value)");
        w.line(&format!("{} = value;", py_arg_name));
        let check = type_check_expression(
            ctx,
            &arg.ty,
            &py_arg_name,
            ctx.is_number_entry(arg.ty.entry),
            func.type_replaced(orig_idx + 1),
        );
        w.line(&format!("if (!{})", check));
        w.indented(|w| {
            w.line(&format!(
                "goto {}_TypeError;",
                ctx.cpython_function_name(func)
            ))
        });
        w.close_block("");
    }
    w.close_block("");
    Ok(())
}

/// The Python variable standing for one modification index: -1 = self,
/// 0 = return value, 1..n = arguments.
fn argument_name_from_index(
    ctx: &EmitCtx,
    data: &OverloadData,
    fid: FunctionId,
    index: i32,
) -> (String, Option<sbkgen_model::ClassId>) {
    let func = ctx.model.function(fid);
    match index {
        -1 => ("self".to_string(), func.implementing_class),
        0 => (
            "pyResult".to_string(),
            func.return_type
                .as_ref()
                .and_then(|t| ctx.model.find_class_by_entry(t.entry)),
        ),
        n => {
            let idx = (n - 1) as usize;
            let removed = func.removed_arguments_before(idx);
            let class = func
                .arguments
                .get(idx)
                .and_then(|a| ctx.model.find_class_by_entry(a.ty.entry));
            let name = if data.uses_py_args(ctx) {
                format!("pyArgs[{}]", idx - removed)
            } else {
                "pyArg".to_string()
            };
            (name, class)
        }
    }
}

/// The C++ call itself plus everything that follows it: return
/// conversion, ownership transfers, reference counts and parenting.
fn write_method_call(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    fid: FunctionId,
    ec: &str,
) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    let max_args = func.visible_argument_count();
    w.line(&format!(
        "// {}{}",
        func.minimal_signature,
        if func.is_reverse_operator() {
            " [reverse operator]"
        } else {
            ""
        }
    ));

    if func.flags.is_abstract {
        w.open_block(
            "if (Shiboken::Object::hasCppWrapper(reinterpret_cast<SbkObject*>(self)))",
        );
        w.line(&format!(
            "PyErr_SetString(PyExc_NotImplementedError, \"pure virtual method '{}.{}()' not implemented.\");",
            func.owner_class
                .map(|c| ctx.model.class(c).name.clone())
                .unwrap_or_default(),
            func.name
        ));
        w.line(&format!("return {};", ec));
        w.close_block("");
    }

    let env = build_snippet_env(ctx, fid, data, Language::Target, None, ec);
    if func.has_injected_code() {
        for snip in func
            .modifications
            .snips(SnipPosition::Beginning, Language::Target)
        {
            snippets::write_snippet(w, ctx, &env, &snip.code)?;
        }
        w.blank();
    }

    write_conversion_rule(w, ctx, data, fid, Language::Native, ec)?;

    let injected_calls_func = func.injected_code_calls_cpp_function();
    if !func.flags.is_user_added && !injected_calls_func {
        let user_args = build_user_args(ctx, func, max_args);
        let method_call = build_method_call_expression(ctx, func, &user_args);

        w.begin_allow_threads();
        if func.flags.is_constructor {
            w.line(&format!("cptr = {};", method_call));
        } else if let (Some(ret), false) = (&func.return_type, func.is_inplace_operator()) {
            w.line(&format!(
                "{} cppResult = {};",
                ret.cpp_signature(ctx.ts),
                method_call
            ));
        } else {
            w.line(&format!("{};", method_call));
        }
        w.end_allow_threads();

        if func.conversion_rule(Language::Target, 0).is_some() {
            let rule = func.conversion_rule(Language::Target, 0).unwrap();
            let mut rule_env = env.clone();
            rule_env.out_var = Some("pyResult".to_string());
            rule_env.in_var = Some("cppResult".to_string());
            let expanded = snippets::expand(ctx, &rule_env, rule)?;
            w.lines(&expanded);
        } else if !func.flags.is_constructor
            && !func.is_inplace_operator()
            && func.return_type.is_some()
        {
            let ret = func.return_type.as_ref().unwrap();
            w.line(&format!(
                "pyResult = {};",
                ctx.to_python_conversion(ret, "cppResult")
            ));
        }
    }

    if func.has_injected_code() && !func.flags.is_constructor {
        w.blank();
        for snip in func.modifications.snips(SnipPosition::End, Language::Target) {
            snippets::write_snippet(w, ctx, &env, &snip.code)?;
        }
    }

    write_ownership_and_refcounts(w, ctx, data, fid)?;
    Ok(())
}

fn build_user_args(ctx: &EmitCtx, func: &sbkgen_model::FunctionEntity, max_args: usize) -> Vec<String> {
    if func.flags.is_copy_constructor {
        return vec!["*cppArg0".to_string()];
    }
    let mut user_args = Vec::new();
    let mut removed = 0usize;
    for (i, arg) in func.arguments.iter().enumerate() {
        if i >= max_args + removed {
            break;
        }
        let ts_index = i + 1;
        let has_rule = func
            .modifications
            .has_conversion_rule(Language::Native, ts_index);
        if func.argument_removed(ts_index) {
            removed += 1;
            if has_rule {
                user_args.push(format!("{}_out", arg.name));
            } else if arg.effective_default().is_some() {
                user_args.push(format!("removed_cppArg{}", i));
            }
        } else {
            let idx = i - removed;
            let deref = ctx.is_value_type_with_copy_ctor_only(arg.ty.entry)
                || (arg.ty.is_reference
                    && ctx.is_wrapper_type(&arg.ty)
                    && !arg.ty.is_pointer())
                || (ctx.should_dereference_when_passing(&arg.ty) && !arg.ty.is_reference);
            let name = if has_rule {
                format!("{}_out", arg.name)
            } else {
                format!("{}cppArg{}", if deref { "*" } else { "" }, idx)
            };
            user_args.push(name);
        }
    }

    // Defaults trailing the supplied arguments must be stated whenever
    // a later argument was modified or removed.
    let mut other_args = Vec::new();
    let mut args_clear = true;
    let mut other_args_modified = false;
    for i in (max_args + removed..func.arguments.len()).rev() {
        let arg = &func.arguments[i];
        let ts_index = i + 1;
        let has_rule = func
            .modifications
            .has_conversion_rule(Language::Native, ts_index);
        let default_modified = arg.default_value.is_some()
            && arg.default_value != arg.original_default_value;
        if args_clear && !default_modified && !has_rule {
            continue;
        }
        args_clear = false;
        other_args_modified |=
            default_modified || has_rule || func.argument_removed(ts_index);
        if has_rule {
            other_args.insert(0, format!("{}_out", arg.name));
        } else {
            other_args.insert(0, format!("removed_cppArg{}", i));
        }
    }
    if other_args_modified {
        user_args.extend(other_args);
    }
    user_args
}

fn build_method_call_expression(
    ctx: &EmitCtx,
    func: &sbkgen_model::FunctionEntity,
    user_args: &[String],
) -> String {
    if func.is_operator_overload() && !func.is_call_operator() {
        return build_operator_call_expression(ctx, func);
    }
    if func.flags.is_constructor {
        let owner = func.owner_class.expect("constructor without owner");
        return format!(
            "new ::{}({})",
            ctx.effective_class_cpp_name(owner),
            user_args.join(", ")
        );
    }

    let mut call = String::new();
    if let Some(owner) = func.owner_class {
        let class = ctx.model.class(owner);
        if func.flags.is_static {
            call.push_str(&format!("::{}::", class.qualified_cpp_name));
        } else if func.flags.is_constant {
            call.push_str(&format!(
                "const_cast<const ::{}*>(cppSelf)->",
                class.qualified_cpp_name
            ));
        } else {
            call.push_str("cppSelf->");
        }
        call.push_str(&func.name);
        call.push_str(&format!("({})", user_args.join(", ")));
        // Virtual methods dispatch through the vtable only when a
        // Python subclass may have overridden them; otherwise the
        // class-qualified call avoids recursing into the trampoline.
        if func.flags.is_virtual && !func.flags.is_abstract && !func.flags.is_static {
            let qualified = format!(
                "{}::{}::{}({})",
                if func.flags.is_constant {
                    format!(
                        "const_cast<const ::{}*>(cppSelf)->",
                        class.qualified_cpp_name
                    )
                } else {
                    "cppSelf->".to_string()
                },
                class.qualified_cpp_name,
                func.name,
                user_args.join(", ")
            );
            return format!(
                "Shiboken::Object::hasCppWrapper(reinterpret_cast<SbkObject*>(self)) ? {} : {}",
                call, qualified
            );
        }
    } else {
        call.push_str(&func.name);
        call.push_str(&format!("({})", user_args.join(", ")));
    }
    call
}

fn build_operator_call_expression(ctx: &EmitCtx, func: &sbkgen_model::FunctionEntity) -> String {
    let mut first_arg = "(*cppSelf)".to_string();
    let mut second_arg = "cppArg0".to_string();
    if let Some(arg) = func.arguments.first() {
        if !func.is_unary_operator() && ctx.should_dereference_when_passing(&arg.ty) {
            second_arg = format!("(*{})", second_arg);
        }
    }
    if func.is_unary_operator() {
        std::mem::swap(&mut first_arg, &mut second_arg);
    }
    let op = func
        .operator
        .as_ref()
        .map(|o| o.symbol.clone())
        .unwrap_or_default();
    if func.is_binary_operator() || func.is_comparison_operator() || func.is_inplace_operator() {
        if func.is_reverse_operator() {
            std::mem::swap(&mut first_arg, &mut second_arg);
        }
        format!("{} {} {}", first_arg, op, second_arg)
    } else {
        format!("{} {}", op, second_arg)
    }
}

fn write_ownership_and_refcounts(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    fid: FunctionId,
) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    let mut has_return_policy = false;

    let ownership_mods: Vec<_> = func
        .modifications
        .arg_mods
        .iter()
        .filter(|m| m.target_ownership.is_some())
        .collect();
    let refcount_mods: Vec<_> = func
        .modifications
        .arg_mods
        .iter()
        .filter(|m| m.reference_count.is_some())
        .collect();

    if !ownership_mods.is_empty() {
        w.blank();
        w.line("// Ownership transferences.");
        for arg_mod in &ownership_mods {
            let (py_arg_name, wrapped_class) =
                argument_name_from_index(ctx, data, fid, arg_mod.index as i32);
            let Some(wrapped_class) = wrapped_class else {
                w.line(&format!(
                    "#error Invalid ownership modification for argument {} ({})",
                    arg_mod.index, py_arg_name
                ));
                ctx.diags.warn(format!(
                    "Invalid ownership modification for argument {} of '{}'",
                    arg_mod.index, func.minimal_signature
                ));
                break;
            };
            if arg_mod.index == 0 {
                has_return_policy = true;
            }
            let call = match arg_mod.target_ownership.unwrap() {
                sbkgen_model::OwnershipAction::TransferToPython => {
                    format!("getOwnership({})", py_arg_name)
                }
                sbkgen_model::OwnershipAction::ReleaseFromPython => {
                    if ctx.model.class(wrapped_class).has_virtual_destructor {
                        format!("releaseOwnership({})", py_arg_name)
                    } else {
                        format!("invalidate({})", py_arg_name)
                    }
                }
                sbkgen_model::OwnershipAction::Invalidate => {
                    format!("invalidate({})", py_arg_name)
                }
            };
            w.line(&format!("Shiboken::Object::{};", call));
        }
    } else if !refcount_mods.is_empty() {
        for arg_mod in &refcount_mods {
            let refcount = arg_mod.reference_count.as_ref().unwrap();
            let py_arg_name = match refcount.action {
                sbkgen_model::RefCountAction::Remove => "Py_None".to_string(),
                _ => argument_name_from_index(ctx, data, fid, arg_mod.index as i32).0,
            };
            let fn_name = match refcount.action {
                sbkgen_model::RefCountAction::Remove => "removeReference",
                _ => "keepReference",
            };
            let key = refcount.key.clone().unwrap_or_else(|| {
                format!("{}{}", func.minimal_signature, arg_mod.index)
            });
            let add_flag = if refcount.action == sbkgen_model::RefCountAction::Add {
                ", true"
            } else {
                ""
            };
            w.line(&format!(
                "Shiboken::Object::{}(reinterpret_cast<SbkObject*>(self), \"{}\", {}{});",
                fn_name, key, py_arg_name, add_flag
            ));
            if arg_mod.index == 0 {
                has_return_policy = true;
            }
        }
    }

    write_parent_child_management(w, ctx, data, fid, !has_return_policy);
    Ok(())
}

/// Explicit parent links from the type system plus the constructor
/// `parent` heuristic, then the return-value heuristic.
fn write_parent_child_management(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    data: &OverloadData,
    fid: FunctionId,
    use_heuristics: bool,
) {
    let func = ctx.model.function(fid);
    let num_args = func.arguments.len() as i32;
    let ctor_heuristic = func.flags.is_constructor
        && ctx.config.enable_parent_ctor_heuristic
        && use_heuristics;

    for arg_index in -1..=num_args {
        let mut action: Option<(i32, i32)> = None; // (parent, child)
        if let Some(arg_mod) = func.modifications.arg_mod(arg_index.max(0) as usize) {
            if arg_index >= 0 {
                if let Some(parent_index) = arg_mod.parent_index {
                    action = Some((parent_index, arg_index));
                }
            }
        }
        if action.is_none() && ctor_heuristic && arg_index > 0 {
            let arg = &func.arguments[(arg_index - 1) as usize];
            if arg.name == "parent" && ctx.ts.entry(arg.ty.entry).is_object_type() {
                action = Some((arg_index, -1));
            }
        }
        let Some((parent_index, child_index)) = action else {
            continue;
        };
        let parent_var = match parent_index {
            0 => "pyResult".to_string(),
            -1 => "self".to_string(),
            n => argument_name_from_index(ctx, data, fid, n).0,
        };
        let child_var = match child_index {
            0 => "pyResult".to_string(),
            -1 => "self".to_string(),
            n => argument_name_from_index(ctx, data, fid, n).0,
        };
        w.line(&format!(
            "Shiboken::Object::setParent({}, {});",
            parent_var, child_var
        ));
    }

    if use_heuristics {
        write_return_value_heuristics(w, ctx, fid);
    }
}

fn write_return_value_heuristics(w: &mut CppWriter, ctx: &EmitCtx, fid: FunctionId) {
    let func = ctx.model.function(fid);
    if !ctx.config.enable_return_value_heuristic
        || func.owner_class.is_none()
        || func.flags.is_static
        || func.flags.is_constructor
        || func.type_replaced(0).is_some()
    {
        return;
    }
    let Some(ret) = &func.return_type else {
        return;
    };
    if ctx.is_pointer_to_wrapper(ret) {
        w.line("Shiboken::Object::setParent(self, pyResult);");
    }
}

/// The snippet environment for target-language snippets of a function.
pub(crate) fn build_snippet_env(
    ctx: &EmitCtx,
    fid: FunctionId,
    data: &OverloadData,
    language: Language,
    last_arg_index: Option<usize>,
    _ec: &str,
) -> SnippetEnv {
    let func = ctx.model.function(fid);
    let use_py_args = data.uses_py_args(ctx);
    let native = language == Language::Native;

    let mut env = SnippetEnv {
        func: Some(fid),
        class: func.owner_class,
        language: Some(language),
        py_self: if native { "pySelf" } else { "self" }.to_string(),
        py_return_var: "pyResult".to_string(),
        context: func.minimal_signature.clone(),
        ..Default::default()
    };

    if func.flags.is_static {
        env.cpp_self = func
            .owner_class
            .map(|c| format!("::{}", ctx.model.class(c).qualified_cpp_name))
            .unwrap_or_default();
        env.cpp_self_accessor = "::".to_string();
    } else if native {
        env.cpp_self = "this".to_string();
        env.cpp_self_accessor = "->".to_string();
    } else {
        env.cpp_self = "cppSelf".to_string();
        env.cpp_self_accessor = if func.is_comparison_operator() {
            ".".to_string()
        } else {
            "->".to_string()
        };
    }

    if func.flags.is_constructor {
        env.return_var = Some("cptr".to_string());
        env.return_is_pointer = true;
    } else if func.return_type.is_some() {
        env.return_var = Some("cppResult".to_string());
        env.return_is_pointer = func
            .return_type
            .as_ref()
            .map(|t| ctx.is_pointer_to_wrapper(t))
            .unwrap_or(false);
    }

    if let Some(owner) = func.owner_class {
        let class = ctx.model.class(owner);
        env.cpp_type_name = Some(class.name.clone());
        env.type_name = Some(if func.flags.is_constructor {
            ctx.effective_class_cpp_name(owner)
        } else {
            class.qualified_cpp_name.clone()
        });
        env.python_type_object = Some(if func.flags.is_static {
            format!("{}.super.ht_type", ctx.py_type_name(class))
        } else {
            format!("{}->ob_type", env.py_self)
        });
    }
    env.function_name = Some(func.name.clone());
    env.py_args_var = Some("pyArgs".to_string());

    let mut removed = 0usize;
    for (i, arg) in func.arguments.iter().enumerate() {
        let ts_index = i + 1;
        let removed_arg = func.argument_removed(ts_index);
        let has_rule = func.modifications.has_conversion_rule(
            if native {
                Language::Target
            } else {
                Language::Native
            },
            ts_index,
        );
        if removed_arg {
            removed += 1;
        }
        let replacement = if native {
            ArgReplacement {
                value: arg.name.clone(),
                is_wrapper_pointer: arg.ty.is_pointer() && ctx.is_wrapper_type(&arg.ty),
                hidden_from_argument_names: false,
            }
        } else if removed_arg && has_rule {
            ArgReplacement {
                value: format!("{}_out", arg.name),
                is_wrapper_pointer: false,
                hidden_from_argument_names: false,
            }
        } else if removed_arg
            || last_arg_index.map_or(false, |last| i > last)
        {
            ArgReplacement {
                value: format!("removed_cppArg{}", i),
                is_wrapper_pointer: false,
                hidden_from_argument_names: true,
            }
        } else {
            let arg_pos = i - removed;
            if ctx.ts.entry(arg.ty.entry).is_custom() {
                ArgReplacement {
                    value: py_arg_at(use_py_args, arg_pos),
                    is_wrapper_pointer: false,
                    hidden_from_argument_names: false,
                }
            } else {
                let mut value = if has_rule {
                    format!("{}_out", arg.name)
                } else {
                    format!("cppArg{}", arg_pos)
                };
                let wrapper = ctx.is_wrapper_type(&arg.ty);
                if wrapper && arg.ty.is_reference && !arg.ty.is_pointer() {
                    value = format!("*{}", value);
                }
                ArgReplacement {
                    value,
                    is_wrapper_pointer: wrapper,
                    hidden_from_argument_names: false,
                }
            }
        };
        env.args.push(replacement);
        env.arg_types.push(arg.ty.cpp_signature(ctx.ts));
        env.py_arg.push(if native {
            format!("PyTuple_GET_ITEM(pyArgs, {})", i)
        } else {
            py_arg_at(use_py_args, i.saturating_sub(removed))
        });
    }

    env
}

/// The virtual-method trampoline on the wrapper subclass: looks up a
/// Python override under the GIL, falls back to the base implementation
/// without it, converts arguments out and the result back in.
pub(crate) fn write_virtual_method_native(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    fid: FunctionId,
) -> Result<(), GenError> {
    let func = ctx.model.function(fid);
    let owner = func.owner_class.expect("virtual method without owner");
    let class = ctx.model.class(owner);
    if ctx.config.enable_pyside_extensions
        && class.is_qobject
        && (func.name == "metaObject" || func.name == "qt_metacall")
    {
        return Ok(());
    }
    let func_name = if func.is_operator_overload() {
        ctx.python_operator_function_name(func)
    } else {
        func.name.clone()
    };

    w.line(&cpp_function_signature(
        ctx,
        func,
        &format!("{}::", ctx.wrapper_name(class)),
    ));
    w.line("{");
    w.indent();

    // The default return expression used on every early-out path.
    let mut default_return = String::new();
    if let Some(ret) = &func.return_type {
        if let Some(arg_mod) = func.modifications.arg_mod(0) {
            if let Some(expr) = &arg_mod.replaced_default_expression {
                default_return = expand_return_expression_indices(ctx, func, expr);
            }
        }
        if default_return.is_empty() {
            match ctx.minimal_constructor(ret) {
                Some(expr) => default_return = expr,
                None => {
                    let msg = format!(
                        "Could not find a minimal constructor for type '{}'. This will result in a compilation error.",
                        ret.cpp_signature(ctx.ts)
                    );
                    ctx.diags.warn(msg.clone());
                    w.blank();
                    w.line(&format!("#error {}", msg));
                }
            }
        }
    }

    if func.flags.is_abstract && func.flags.is_modified_removed {
        ctx.diags.warn(format!(
            "Pure virtual method '{}::{}' must be implemented but was completely removed on the type system.",
            class.name, func.minimal_signature
        ));
        w.line(&format!("return {};", default_return));
        w.dedent();
        w.line("}");
        w.blank();
        return Ok(());
    }

    let data = OverloadData::new(ctx, &[fid]);
    let env = build_snippet_env(ctx, fid, &data, Language::Native, None, "0");
    for snip in func
        .modifications
        .snips(SnipPosition::Declaration, Language::Native)
    {
        snippets::write_snippet(w, ctx, &env, &snip.code)?;
    }

    w.line("Shiboken::GilState gil;");
    w.line("if (PyErr_Occurred())");
    w.indented(|w| w.line(&format!("return {};", default_return)));

    w.line(&format!(
        "Shiboken::AutoDecRef pyOverride(Shiboken::BindingManager::instance().getOverride(this, \"{}\"));",
        func_name
    ));
    w.open_block("if (pyOverride.isNull())");
    if func.flags.is_abstract {
        w.line(&format!(
            "PyErr_SetString(PyExc_NotImplementedError, \"pure virtual method '{}.{}()' not implemented.\");",
            class.name, func_name
        ));
        w.line(&format!("return {};", default_return));
    } else {
        w.line("gil.release();");
        let args = func
            .arguments
            .iter()
            .map(|a| a.name.clone())
            .join(", ");
        w.line(&format!(
            "return this->::{}::{}({});",
            class.qualified_cpp_name, func.name, args
        ));
    }
    w.close_block("");
    w.blank();

    // Pack the C++ arguments into the Python call tuple.
    let visible: Vec<(usize, &Argument)> = func.visible_arguments().collect();
    if visible.is_empty() {
        w.line("Shiboken::AutoDecRef pyArgs(PyTuple_New(0));");
    } else {
        let format_units: String = visible
            .iter()
            .map(|(i, arg)| format_unit(ctx, func, *i, arg))
            .collect();
        w.line(&format!(
            "Shiboken::AutoDecRef pyArgs(Py_BuildValue(\"({})\",",
            format_units
        ));
        for (idx, (i, arg)) in visible.iter().enumerate() {
            let conversion =
                if func.conversion_rule(Language::Target, i + 1).is_some() {
                    format!("{}_out", arg.name)
                } else if format_unit(ctx, func, *i, arg) == 'N' {
                    ctx.to_python_conversion(&arg.ty, &arg.name)
                } else {
                    arg.name.clone()
                };
            let comma = if idx + 1 == visible.len() { "" } else { "," };
            w.indented(|w| w.line(&format!("{}{}", conversion, comma)));
        }
        w.line("));");
    }
    w.blank();

    // Argument conversion rules run before the call tuple is used.
    for (i, arg) in &visible {
        if let Some(rule) = func.conversion_rule(Language::Target, i + 1) {
            let mut rule_env = env.clone();
            rule_env.in_var = Some(arg.name.clone());
            rule_env.out_var = Some(format!("{}_out", arg.name));
            let expanded = snippets::expand(ctx, &rule_env, rule)?;
            w.lines(&expanded);
        }
    }

    let beginning_snips: Vec<_> = func
        .modifications
        .snips(SnipPosition::Beginning, Language::Native)
        .collect();
    if !beginning_snips.is_empty() {
        if beginning_snips.iter().any(|s| s.code.contains("%PYSELF")) {
            w.line(
                "PyObject* pySelf = (PyObject*)Shiboken::BindingManager::instance().retrieveWrapper(this);",
            );
        }
        for snip in beginning_snips {
            snippets::write_snippet(w, ctx, &env, &snip.code)?;
        }
        w.blank();
    }

    w.line("Shiboken::AutoDecRef pyResult(PyObject_Call(pyOverride, pyArgs, NULL));");
    w.line("// An error happened in python code!");
    w.open_block("if (pyResult.isNull())");
    w.line("PyErr_Print();");
    w.line(&format!("return {};", default_return));
    w.close_block("");

    if let Some(ret) = &func.return_type {
        if func.type_replaced(0) != Some("PyObject") {
            w.line("// Check return type");
            match func.type_replaced(0) {
                None => {
                    w.line(&format!(
                        "PythonToCppFunc pythonToCpp = {}pyResult);",
                        ctx.is_convertible_function(ret)
                    ));
                    w.open_block("if (!pythonToCpp)");
                    w.line(&format!(
                        "Shiboken::warning(PyExc_RuntimeWarning, 2, \"Invalid return value in function %s, expected %s, got %s.\", \"{}.{}\", {}, pyResult->ob_type->tp_name);",
                        class.name,
                        func_name,
                        virtual_return_type_name(ctx, func)
                    ));
                    w.line(&format!("return {};", default_return));
                    w.close_block("");
                }
                Some(replaced) => {
                    w.line("PythonToCppFunc pythonToCpp = 0;");
                    let check = type_check_expression(
                        ctx,
                        ret,
                        "pyResult",
                        ctx.is_number_entry(ret.entry),
                        Some(replaced),
                    );
                    w.line(&format!("bool typeIsValid = {};", check));
                    let extra = if ctx.is_pointer_to_wrapper(ret) {
                        " && pyResult != Py_None"
                    } else {
                        ""
                    };
                    w.open_block(&format!("if (!typeIsValid{})", extra));
                    w.line(&format!(
                        "Shiboken::warning(PyExc_RuntimeWarning, 2, \"Invalid return value in function %s, expected %s, got %s.\", \"{}.{}\", {}, pyResult->ob_type->tp_name);",
                        class.name,
                        func_name,
                        virtual_return_type_name(ctx, func)
                    ));
                    w.line(&format!("return {};", default_return));
                    w.close_block("");
                }
            }
        }

        if let Some(rule) = func.conversion_rule(Language::Native, 0) {
            let mut rule_env = env.clone();
            rule_env.in_var = Some("pyResult".to_string());
            rule_env.out_var = Some("cppResult".to_string());
            let expanded = snippets::expand(ctx, &rule_env, rule)?;
            w.lines(&expanded);
        } else {
            write_python_to_cpp_type_conversion(w, ctx, ret, "pyResult", "cppResult", None);
        }
    }

    // Native-side ownership release on the returned wrapper.
    for arg_mod in &func.modifications.arg_mods {
        if arg_mod.index == 0
            && arg_mod.native_ownership == Some(sbkgen_model::OwnershipAction::ReleaseFromPython)
        {
            w.line("if (Shiboken::Object::checkType(pyResult))");
            w.indented(|w| {
                w.line("Shiboken::Object::releaseOwnership(pyResult);");
            });
        }
    }

    for snip in func.modifications.snips(SnipPosition::End, Language::Native) {
        w.blank();
        snippets::write_snippet(w, ctx, &env, &snip.code)?;
    }

    if let Some(ret) = &func.return_type {
        let deref = if ret.is_reference && !ret.is_pointer() {
            "*"
        } else {
            ""
        };
        w.line(&format!("return {}cppResult;", deref));
    }
    w.dedent();
    w.assert_gil_balanced();
    w.line("}");
    w.blank();
    Ok(())
}

fn virtual_return_type_name(ctx: &EmitCtx, func: &sbkgen_model::FunctionEntity) -> String {
    let Some(ret) = &func.return_type else {
        return "\"\"".to_string();
    };
    if let Some(replaced) = func.type_replaced(0) {
        return format!("\"{}\"", replaced);
    }
    let entry = ctx.ts.entry(ret.entry);
    if entry.is_container() {
        return format!("\"{}\"", entry.qualified_cpp_name);
    }
    if entry.is_primitive() {
        return format!("\"{}\"", entry.name());
    }
    format!(
        "Shiboken::SbkType< ::{} >()->tp_name",
        entry.qualified_cpp_name
    )
}

/// `%<N>` inside a replaced default-return expression refers to the
/// N-th C++ argument by name.
fn expand_return_expression_indices(
    ctx: &EmitCtx,
    func: &sbkgen_model::FunctionEntity,
    expr: &str,
) -> String {
    let mut result = expr.to_string();
    for (i, arg) in func.arguments.iter().enumerate().rev() {
        result = result.replace(&format!("%{}", i + 1), &arg.name);
    }
    let _ = ctx;
    result
}

fn format_unit(ctx: &EmitCtx, func: &sbkgen_model::FunctionEntity, index: usize, arg: &Argument) -> char {
    if func.type_replaced(index + 1).is_some() {
        return 'N';
    }
    let ty = &arg.ty;
    let entry = ctx.ts.entry(ty.entry);
    if ctx.is_cstring(ty) {
        return 'z';
    }
    if entry.is_complex()
        || entry.is_enum()
        || entry.is_flags()
        || entry.is_container()
        || ty.is_reference
        || ty.is_pointer()
    {
        return 'N';
    }
    if entry.is_primitive() {
        let resolved = ctx.ts.entry(ctx.ts.basic_aliased_entry(ty.entry));
        if let Some(&unit) = FORMAT_UNITS.get(resolved.qualified_cpp_name.as_str()) {
            return unit;
        }
    }
    'N'
}

/// `Ret Prefix::name(args)` in original-type spelling, defaults
/// omitted, for wrapper declarations and definitions.
pub(crate) fn cpp_function_signature(
    ctx: &EmitCtx,
    func: &sbkgen_model::FunctionEntity,
    prefix: &str,
) -> String {
    let ret = func
        .return_type
        .as_ref()
        .map(|t| t.cpp_signature(ctx.ts))
        .unwrap_or_else(|| "void".to_string());
    let args = func
        .arguments
        .iter()
        .map(|a| format!("{} {}", a.ty.cpp_signature(ctx.ts), a.name))
        .join(", ");
    let constness = if func.flags.is_constant { " const" } else { "" };
    format!("{} {}{}({}){}", ret, prefix, func.name, args, constness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_fixtures::ModelBuilder;
    use sbkgen_model::OperatorKind;

    fn gil_balance(code: &str) -> bool {
        code.matches("PyEval_SaveThread").count() == code.matches("PyEval_RestoreThread").count()
    }

    #[test]
    fn exact_float_test_precedes_generic_int_test() {
        // C(3.0) must select the double overload: the precise
        // PyFloat_Check runs first because the int predicate would
        // accept any number.
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let f_int = b.constructor(class, &[("v", b.int_ty())]);
        let f_double = b.constructor(class, &[("v", b.double_ty())]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_constructor_wrapper(&mut w, &ctx, &[f_int, f_double]).unwrap();
        let out = w.into_string();
        let float_check = out.find("PyFloat_Check(").unwrap();
        let int_check = out.find("PrimitiveTypeConverter<int>()").unwrap();
        assert!(
            float_check < int_check,
            "the exact float check must precede the generic int check"
        );
        assert!(gil_balance(&out));
    }

    #[test]
    fn single_overload_dispatches_without_switch() {
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let int_ty = b.int_ty();
        let f = b.method(class, "only", &[("v", int_ty)], None);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_method_wrapper(&mut w, &ctx, &[f]).unwrap();
        let out = w.into_string();
        assert!(!out.contains("switch (overloadId)"));
        assert!(out.contains("overloadId = 0; // only(int)"));
        assert!(gil_balance(&out));
    }

    #[test]
    fn abstract_class_constructor_raises_not_implemented() {
        let mut b = ModelBuilder::new();
        let class = b.object_class("AbstractBase");
        let f = b.constructor(class, &[]);
        b.model.class_mut(class).is_abstract = true;
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_constructor_wrapper(&mut w, &ctx, &[f]).unwrap();
        let out = w.into_string();
        assert!(out.contains("PyExc_NotImplementedError"));
        assert!(out.contains("represents a C++ abstract class and cannot be instantiated"));
    }

    #[test]
    fn parent_heuristic_emits_single_set_parent() {
        let mut b = ModelBuilder::new();
        let parent_class = b.object_class("Parent");
        let child_class = b.object_class("Child");
        let parent_ty = b.pointer_to(parent_class);
        let f = b.constructor_with_defaults(child_class, &[("parent", parent_ty, Some("0"))]);
        b.config.enable_parent_ctor_heuristic = true;
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_constructor_wrapper(&mut w, &ctx, &[f]).unwrap();
        let out = w.into_string();
        assert_eq!(out.matches("Shiboken::Object::setParent(").count(), 1);
        assert!(out.contains("setParent(pyArgs[0], self)"));
    }

    #[test]
    fn no_parent_heuristic_without_flag() {
        let mut b = ModelBuilder::new();
        let parent_class = b.object_class("Parent");
        let child_class = b.object_class("Child");
        let parent_ty = b.pointer_to(parent_class);
        let f = b.constructor_with_defaults(child_class, &[("parent", parent_ty, Some("0"))]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_constructor_wrapper(&mut w, &ctx, &[f]).unwrap();
        assert!(!w.into_string().contains("setParent"));
    }

    #[test]
    fn virtual_trampoline_checks_override_and_balances_gil() {
        let mut b = ModelBuilder::new();
        let class = b.object_class("Handler");
        let int_ty = b.int_ty();
        let f = b.method(class, "handle", &[("v", int_ty.clone())], Some(int_ty));
        b.function_mut(f).flags.is_virtual = true;
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_virtual_method_native(&mut w, &ctx, f).unwrap();
        let out = w.into_string();
        assert!(out.contains("Shiboken::GilState gil;"));
        assert!(out.contains("getOverride(this, \"handle\")"));
        assert!(out.contains("gil.release();"));
        assert!(out.contains("this->::Handler::handle(v)"));
        assert!(out.contains("PyExc_RuntimeWarning"));
    }

    #[test]
    fn reverse_binary_operator_swaps_roles() {
        let mut b = ModelBuilder::new();
        let class = b.value_class("V");
        let double_ty = b.double_ty();
        let v_ty = b.value_ty(class);
        let f = b.operator(
            class,
            "*",
            OperatorKind::Binary,
            &[("other", double_ty)],
            Some(v_ty),
        );
        b.function_mut(f).operator.as_mut().unwrap().is_reverse = true;
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_method_wrapper(&mut w, &ctx, &[f]).unwrap();
        let out = w.into_string();
        assert!(out.contains("[reverse operator]"));
        assert!(out.contains("cppArg0 * (*cppSelf)"));
    }

    #[test]
    fn static_and_instance_overloads_guard_self_extraction() {
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let int_ty = b.int_ty();
        let m = b.method(class, "f", &[("v", int_ty.clone())], None);
        let s = b.method(class, "f", &[("v", b.double_ty())], None);
        b.function_mut(s).flags.is_static = true;
        let _ = m;
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        write_method_wrapper(&mut w, &ctx, &[m, s]).unwrap();
        let out = w.into_string();
        assert!(out.contains("if (self) {"));
    }

    #[test]
    fn removed_argument_without_default_is_fatal() {
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let int_ty = b.int_ty();
        let f = b.method(class, "f", &[("v", int_ty)], None);
        b.function_mut(f)
            .modifications
            .arg_mods
            .push(sbkgen_model::ArgumentModification {
                index: 1,
                removed: true,
                ..Default::default()
            });
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut w = CppWriter::new();
        let err = write_method_wrapper(&mut w, &ctx, &[f]).unwrap_err();
        assert!(err.to_string().contains("was removed"));
    }
}

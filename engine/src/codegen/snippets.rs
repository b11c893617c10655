// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Injected-code placeholder substitution.
//!
//! Snippet text is tokenised once into literal and placeholder segments
//! and substituted segment by segment, so `%PYARG_10` can never be
//! mangled into the replacement of `%PYARG_1` followed by a stray `0`.

use sbkgen_model::{ClassId, FunctionId, Language};

use super::EmitCtx;
use crate::errors::GenError;
use crate::writer::{CppWriter, BEGIN_ALLOW_THREADS, END_ALLOW_THREADS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvKind {
    ToPython,
    ToCpp,
    CheckType,
    IsConvertible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `%NAME`; a trailing `.` is folded into the placeholder for the
    /// member-access forms (`%CPPSELF.`, `%0.`, `%1.`).
    Named { name: String, dotted: bool },
    /// `%<N>`, optionally dotted.
    Numbered { index: usize, dotted: bool },
    /// `%PYARG_<N>`.
    PyArg(usize),
    /// `%ARG<N>_TYPE`.
    ArgType(usize),
    /// `%CONVERTTOPYTHON[T](arg)` and friends. For `ToCpp`, `receiver`
    /// holds the `var =` (and possibly its declaration) captured from
    /// the text immediately before the directive.
    Converter {
        kind: ConvKind,
        type_name: String,
        arg: String,
        receiver: Option<String>,
    },
}

const NAMED_PLACEHOLDERS: &[&str] = &[
    "PYSELF",
    "CPPSELF",
    "ARGUMENT_NAMES",
    "FUNCTION_NAME",
    "TYPE",
    "CPPTYPE",
    "BEGIN_ALLOW_THREADS",
    "END_ALLOW_THREADS",
    "PYTHONTYPEOBJECT",
    "PYTHON_ARGUMENTS",
    "PYTHON_METHOD_OVERRIDE",
    "in",
    "out",
];

fn read_balanced_parens(text: &str) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[1..i], i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Pop a trailing `Type var =` / `var =` receiver off a literal, for
/// the `%CONVERTTOCPP` declared-variable form.
fn split_receiver(literal: &str) -> (String, Option<String>) {
    let trimmed_end = literal.trim_end();
    if !trimmed_end.ends_with('=') || trimmed_end.ends_with("==") {
        return (literal.to_string(), None);
    }
    let line_start = trimmed_end.rfind('\n').map(|p| p + 1).unwrap_or(0);
    let receiver = trimmed_end[line_start..].trim().to_string();
    (literal[..line_start].to_string(), Some(receiver))
}

/// Parse snippet text into segments. Unknown `%` sequences stay
/// literal; the expander decides whether that is an error.
pub fn tokenize(code: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = code;

    'outer: while let Some(pos) = rest.find('%') {
        literal.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        // Converter directives first: they have the longest spelling.
        for (kind, name) in [
            (ConvKind::ToPython, "CONVERTTOPYTHON"),
            (ConvKind::ToCpp, "CONVERTTOCPP"),
            (ConvKind::CheckType, "CHECKTYPE"),
            (ConvKind::IsConvertible, "ISCONVERTIBLE"),
        ] {
            if let Some(after_name) = after.strip_prefix(name) {
                if let Some(close) = after_name.find(']') {
                    if after_name.starts_with('[') {
                        let type_name = after_name[1..close].trim().to_string();
                        if let Some((arg, consumed)) =
                            read_balanced_parens(&after_name[close + 1..])
                        {
                            let receiver = if kind == ConvKind::ToCpp {
                                let (kept, receiver) = split_receiver(&literal);
                                literal = kept;
                                receiver
                            } else {
                                None
                            };
                            if !literal.is_empty() {
                                segments.push(Segment::Literal(std::mem::take(&mut literal)));
                            }
                            segments.push(Segment::Converter {
                                kind,
                                type_name,
                                arg: arg.trim().to_string(),
                                receiver,
                            });
                            rest = &after_name[close + 1 + consumed..];
                            continue 'outer;
                        }
                    }
                }
            }
        }

        // %PYARG_<N>
        if let Some(tail) = after.strip_prefix("PYARG_") {
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::PyArg(digits.parse().unwrap()));
                rest = &tail[digits.len()..];
                continue;
            }
        }

        // %ARG<N>_TYPE
        if let Some(tail) = after.strip_prefix("ARG") {
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() && tail[digits.len()..].starts_with("_TYPE") {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::ArgType(digits.parse().unwrap()));
                rest = &tail[digits.len() + "_TYPE".len()..];
                continue;
            }
        }

        // %<N>
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            let mut consumed = digits.len();
            let dotted = after[consumed..].starts_with('.');
            if dotted {
                consumed += 1;
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Numbered {
                index: digits.parse().unwrap(),
                dotted,
            });
            rest = &after[consumed..];
            continue;
        }

        // Named placeholders, longest first so %PYTHON_ARGUMENTS is not
        // split at %PYTHON.
        let mut names: Vec<&str> = NAMED_PLACEHOLDERS.to_vec();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        for name in names {
            if let Some(tail) = after.strip_prefix(name) {
                // `%in` must not match the front of `%index`.
                if tail
                    .chars()
                    .next()
                    .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
                {
                    continue;
                }
                let mut consumed = name.len();
                let dotted = (name == "CPPSELF" || name == "PYTHONTYPEOBJECT")
                    && tail.starts_with('.');
                if dotted {
                    consumed += 1;
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Named {
                    name: name.to_string(),
                    dotted,
                });
                rest = &after[consumed..];
                continue 'outer;
            }
        }

        // Not a placeholder we know; keep the '%' literal.
        literal.push('%');
        rest = after;
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// How one numbered argument reads inside an injected snippet.
#[derive(Debug, Clone)]
pub struct ArgReplacement {
    pub value: String,
    /// Wrapper held behind a pointer: `%N.` becomes `value->`.
    pub is_wrapper_pointer: bool,
    /// Removed arguments are excluded from `%ARGUMENT_NAMES`.
    pub hidden_from_argument_names: bool,
}

/// The resolved values a snippet can refer to. Built by the function
/// and class emitters for each site.
#[derive(Debug, Clone, Default)]
pub struct SnippetEnv {
    pub func: Option<FunctionId>,
    pub class: Option<ClassId>,
    pub language: Option<Language>,
    pub py_self: String,
    pub cpp_self: String,
    /// `->`, `.` or `::` depending on staticness and operator kind.
    pub cpp_self_accessor: String,
    pub return_var: Option<String>,
    /// The return value is a wrapper behind a pointer (`%0.` -> `->`).
    pub return_is_pointer: bool,
    pub py_return_var: String,
    pub py_args_var: Option<String>,
    /// index (1-based) -> Python argument expression.
    pub py_arg: Vec<String>,
    /// index (1-based) -> C++ argument replacement.
    pub args: Vec<ArgReplacement>,
    /// index (1-based) -> C++ type spelling for %ARG<N>_TYPE.
    pub arg_types: Vec<String>,
    pub function_name: Option<String>,
    pub type_name: Option<String>,
    pub cpp_type_name: Option<String>,
    pub python_type_object: Option<String>,
    pub in_var: Option<String>,
    pub out_var: Option<String>,
    /// Where the snippet lives, for error messages.
    pub context: String,
}

impl SnippetEnv {
    fn unresolved(&self, placeholder: &str) -> GenError {
        GenError::UnresolvedPlaceholder {
            placeholder: placeholder.to_string(),
            context: self.context.clone(),
        }
    }
}

/// Expand a snippet against an environment. Every placeholder must
/// resolve; an unknown or out-of-context placeholder is an error.
pub fn expand(ctx: &EmitCtx, env: &SnippetEnv, code: &str) -> Result<String, GenError> {
    let mut out = String::new();
    for segment in tokenize(code) {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::PyArg(0) => out.push_str(&env.py_return_var),
            Segment::PyArg(n) => match env.py_arg.get(n - 1) {
                Some(arg) => out.push_str(arg),
                None => return Err(env.unresolved(&format!("%PYARG_{}", n))),
            },
            Segment::ArgType(n) => match env.arg_types.get(n - 1) {
                Some(ty) => out.push_str(ty),
                None => return Err(env.unresolved(&format!("%ARG{}_TYPE", n))),
            },
            Segment::Numbered { index: 0, dotted } => {
                let var = env
                    .return_var
                    .as_ref()
                    .ok_or_else(|| env.unresolved("%0"))?;
                out.push_str(var);
                if dotted {
                    out.push_str(if env.return_is_pointer { "->" } else { "." });
                }
            }
            Segment::Numbered { index, dotted } => {
                let arg = env
                    .args
                    .get(index - 1)
                    .ok_or_else(|| env.unresolved(&format!("%{}", index)))?;
                if dotted {
                    let stripped = arg.value.strip_prefix('*').unwrap_or(&arg.value);
                    out.push_str(stripped);
                    out.push_str(if arg.is_wrapper_pointer { "->" } else { "." });
                } else {
                    out.push_str(&arg.value);
                }
            }
            Segment::Named { name, dotted } => match name.as_str() {
                "PYSELF" => out.push_str(&env.py_self),
                "CPPSELF" => {
                    out.push_str(&env.cpp_self);
                    if dotted {
                        out.push_str(&env.cpp_self_accessor);
                    }
                }
                "ARGUMENT_NAMES" => {
                    let names: Vec<&str> = env
                        .args
                        .iter()
                        .filter(|a| !a.hidden_from_argument_names)
                        .map(|a| a.value.as_str())
                        .collect();
                    out.push_str(&names.join(", "));
                }
                "FUNCTION_NAME" => out.push_str(
                    env.function_name
                        .as_ref()
                        .ok_or_else(|| env.unresolved("%FUNCTION_NAME"))?,
                ),
                "TYPE" => out.push_str(
                    env.type_name
                        .as_ref()
                        .ok_or_else(|| env.unresolved("%TYPE"))?,
                ),
                "CPPTYPE" => out.push_str(
                    env.cpp_type_name
                        .as_ref()
                        .ok_or_else(|| env.unresolved("%CPPTYPE"))?,
                ),
                "BEGIN_ALLOW_THREADS" => out.push_str(BEGIN_ALLOW_THREADS),
                "END_ALLOW_THREADS" => out.push_str(END_ALLOW_THREADS),
                "PYTHONTYPEOBJECT" => {
                    let obj = env
                        .python_type_object
                        .as_ref()
                        .ok_or_else(|| env.unresolved("%PYTHONTYPEOBJECT"))?;
                    out.push_str(obj);
                    if dotted {
                        out.push_str("->");
                    }
                }
                "PYTHON_ARGUMENTS" => out.push_str(
                    env.py_args_var
                        .as_ref()
                        .ok_or_else(|| env.unresolved("%PYTHON_ARGUMENTS"))?,
                ),
                "PYTHON_METHOD_OVERRIDE" => out.push_str("pyOverride"),
                "in" => out.push_str(
                    env.in_var.as_ref().ok_or_else(|| env.unresolved("%in"))?,
                ),
                "out" => out.push_str(
                    env.out_var.as_ref().ok_or_else(|| env.unresolved("%out"))?,
                ),
                other => return Err(env.unresolved(&format!("%{}", other))),
            },
            Segment::Converter {
                kind,
                type_name,
                arg,
                receiver,
            } => {
                let expanded_arg = expand(ctx, env, &arg)?;
                out.push_str(&expand_converter(
                    ctx,
                    env,
                    kind,
                    &type_name,
                    &expanded_arg,
                    receiver.as_deref(),
                )?);
            }
        }
    }
    Ok(out)
}

fn close_open_call(prefix: &str, arg: &str) -> String {
    if prefix.ends_with(", ") || prefix.ends_with('(') {
        format!("{}{})", prefix, arg)
    } else {
        format!("{}({})", prefix, arg)
    }
}

fn expand_converter(
    ctx: &EmitCtx,
    env: &SnippetEnv,
    kind: ConvKind,
    type_name: &str,
    arg: &str,
    receiver: Option<&str>,
) -> Result<String, GenError> {
    let ty = ctx.parse_type_string(type_name).ok_or_else(|| {
        GenError::UnresolvedType {
            signature: env.context.clone(),
            context: format!("converter directive type '{}'", type_name),
        }
    })?;
    Ok(match kind {
        ConvKind::ToPython => ctx.to_python_conversion(&ty, arg),
        ConvKind::CheckType => close_open_call(&ctx.check_function(&ty), arg),
        ConvKind::IsConvertible => close_open_call(&ctx.is_convertible_function(&ty), arg),
        ConvKind::ToCpp => {
            // Attribution must be declared-variable style: the receiver
            // (with or without its declaration) was captured from the
            // text before the directive and is rewritten into an
            // address argument of the conversion call.
            let receiver = receiver.ok_or_else(|| {
                GenError::UnresolvedPlaceholder {
                    placeholder: "%CONVERTTOCPP".to_string(),
                    context: format!(
                        "{}: %CONVERTTOCPP must appear as 'T var = %CONVERTTOCPP[T](...)'",
                        env.context
                    ),
                }
            })?;
            let receiver = receiver.trim_end_matches('=').trim();
            let (decl_type, var_name) = match receiver.rfind(|c: char| c.is_whitespace()) {
                Some(space) => (
                    Some(receiver[..space].trim()),
                    receiver[space + 1..].trim(),
                ),
                None => (None, receiver),
            };
            let mut result = String::new();
            if let Some(decl_type) = decl_type {
                let init = ctx
                    .minimal_constructor(&ty)
                    .map(|c| format!(" = {}", c))
                    .unwrap_or_default();
                result.push_str(&format!("{} {}{};\n", decl_type, var_name, init));
            }
            let (prefix, var) = match var_name.strip_prefix('*') {
                Some(stripped) => ("", stripped.trim()),
                None => ("&", var_name),
            };
            result.push_str(&format!(
                "{}{}, {}({}))",
                ctx.to_cpp_conversion_function(&ty),
                arg,
                prefix,
                var
            ));
            result
        }
    })
}

/// Expand and write one snippet body with the injection markers the
/// generated code carries around user code.
pub fn write_snippet(
    w: &mut CppWriter,
    ctx: &EmitCtx,
    env: &SnippetEnv,
    code: &str,
) -> Result<(), GenError> {
    if code.trim().is_empty() {
        return Ok(());
    }
    let expanded = expand(ctx, env, code)?;
    w.line("// Begin code injection");
    w.lines(&expanded);
    w.line("// End of code injection");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_fixtures::ModelBuilder;
    use indoc::indoc;

    fn env() -> SnippetEnv {
        SnippetEnv {
            py_self: "self".to_string(),
            cpp_self: "cppSelf".to_string(),
            cpp_self_accessor: "->".to_string(),
            py_return_var: "pyResult".to_string(),
            return_var: Some("cppResult".to_string()),
            py_arg: vec!["pyArgs[0]".to_string(), "pyArgs[1]".to_string()],
            args: vec![
                ArgReplacement {
                    value: "cppArg0".to_string(),
                    is_wrapper_pointer: false,
                    hidden_from_argument_names: false,
                },
                ArgReplacement {
                    value: "cppArg1".to_string(),
                    is_wrapper_pointer: true,
                    hidden_from_argument_names: false,
                },
            ],
            arg_types: vec!["int".to_string()],
            function_name: Some("method".to_string()),
            context: "test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn pyarg_10_does_not_collide_with_pyarg_1() {
        let segments = tokenize("%PYARG_10 and %PYARG_1");
        assert_eq!(segments[0], Segment::PyArg(10));
        assert_eq!(segments[2], Segment::PyArg(1));
    }

    #[test]
    fn numbered_placeholders_respect_boundaries() {
        let segments = tokenize("f(%1, %12)");
        assert!(segments.contains(&Segment::Numbered {
            index: 1,
            dotted: false
        }));
        assert!(segments.contains(&Segment::Numbered {
            index: 12,
            dotted: false
        }));
    }

    #[test]
    fn expands_common_placeholders() {
        let b = ModelBuilder::new();
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = expand(
            &ctx,
            &env(),
            "%CPPSELF.%FUNCTION_NAME(%ARGUMENT_NAMES); %PYARG_0 = 0;",
        )
        .unwrap();
        assert_eq!(out, "cppSelf->method(cppArg0, cppArg1); pyResult = 0;");
    }

    #[test]
    fn dotted_wrapper_argument_becomes_arrow() {
        let b = ModelBuilder::new();
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = expand(&ctx, &env(), "%2.update(); %1.count();").unwrap();
        assert_eq!(out, "cppArg1->update(); cppArg0.count();");
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let b = ModelBuilder::new();
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let mut bare = SnippetEnv {
            context: "test".to_string(),
            ..Default::default()
        };
        bare.py_return_var = "pyResult".to_string();
        assert!(expand(&ctx, &bare, "%FUNCTION_NAME").is_err());
    }

    #[test]
    fn converttocpp_rewrites_declaration() {
        let mut b = ModelBuilder::new();
        let point = b.value_class("Point");
        b.constructor(point, &[]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = expand(&ctx, &env(), "Point p = %CONVERTTOCPP[Point](pyArgs[0]);").unwrap();
        assert!(out.contains("Point p = ::Point();"), "declaration kept: {}", out);
        assert!(
            out.contains("pythonToCppCopy") || out.contains("pythonToCpp"),
            "conversion call present: {}",
            out
        );
        assert!(out.contains("&(p))"), "receiver passed by address: {}", out);
    }

    #[test]
    fn converttopython_produces_full_expression() {
        let b = ModelBuilder::new();
        let int_ty = b.int_ty();
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let expected = ctx.to_python_conversion(&int_ty, "cppArg0");
        let out = expand(&ctx, &env(), "%PYARG_0 = %CONVERTTOPYTHON[int](cppArg0);").unwrap();
        assert_eq!(out, format!("pyResult = {};", expected));
    }

    #[test]
    fn allow_threads_pair_expands_to_thread_state_calls() {
        let b = ModelBuilder::new();
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);
        let out = expand(
            &ctx,
            &env(),
            indoc! {"
                %BEGIN_ALLOW_THREADS
                %CPPSELF.%FUNCTION_NAME(%ARGUMENT_NAMES);
                %END_ALLOW_THREADS
            "},
        )
        .unwrap();
        assert!(out.contains("PyEval_SaveThread()"));
        assert!(out.contains("PyEval_RestoreThread(_save)"));
        assert!(out.contains("cppSelf->method(cppArg0, cppArg1);"));
    }
}

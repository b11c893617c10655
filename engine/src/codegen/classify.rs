// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Classifies a type use into the disjoint category every emitter
//! branches on, and derives the call-site decisions (dereferencing,
//! minimal constructors) that follow from the category.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use sbkgen_model::{
    AbstractType, ClassId, ContainerKind, TypeEntryId, TypeEntryKind,
};

use super::EmitCtx;

/// The exhaustive category of one type use in a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeCategory {
    /// `const char*` with exactly one indirection.
    CString,
    /// `void*` with exactly one indirection.
    VoidPointer,
    /// C++ built-in numeric/bool/char (or `std::string`).
    CppPrimitive,
    /// Type-system-declared primitive that is not a C++ built-in.
    UserPrimitive,
    Enum,
    Flags,
    /// Complex value type used by value or reference.
    WrapperValue,
    /// Complex object type used by value or reference.
    WrapperObject,
    /// Wrapper type behind one or more indirections.
    PointerToWrapper,
    Container(ContainerKind),
    Custom,
}

/// CPython API family backing each C++ primitive name.
static PYTHON_PRIMITIVE_NAME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("bool", "PyBool");
    m.insert("char", "SbkChar");
    m.insert("signed char", "SbkChar");
    m.insert("unsigned char", "SbkChar");
    m.insert("int", "PyInt");
    m.insert("signed int", "PyInt");
    m.insert("uint", "PyInt");
    m.insert("unsigned int", "PyInt");
    m.insert("short", "PyInt");
    m.insert("ushort", "PyInt");
    m.insert("signed short", "PyInt");
    m.insert("signed short int", "PyInt");
    m.insert("unsigned short", "PyInt");
    m.insert("unsigned short int", "PyInt");
    m.insert("long", "PyInt");
    m.insert("signed long", "PyInt");
    m.insert("double", "PyFloat");
    m.insert("float", "PyFloat");
    m.insert("unsigned long", "PyLong");
    m.insert("ulong", "PyLong");
    m.insert("long long", "PyLong");
    m.insert("__int64", "PyLong");
    m.insert("unsigned long long", "PyLong");
    m.insert("unsigned __int64", "PyLong");
    m.insert("std::string", "PyString");
    m
});

pub fn python_primitive_name(cpp_name: &str) -> Option<&'static str> {
    PYTHON_PRIMITIVE_NAME.get(cpp_name).copied()
}

/// Signed integer primitives, for the overload sorting rules.
pub const SIGNED_INTEGER_PRIMITIVES: &[&str] = &["int", "short", "long"];

/// Primitives that are numbers but not integers, for the same rules.
pub const NON_INTEGER_PRIMITIVES: &[&str] = &["float", "double", "bool"];

/// All C++ primitive names that participate in enum-before-primitive
/// ordering, in the original's declaration order.
pub const ORDERED_PRIMITIVES: &[&str] = &[
    "int",
    "unsigned int",
    "long",
    "unsigned long",
    "short",
    "unsigned short",
    "bool",
    "unsigned char",
    "char",
    "float",
    "double",
    "const char*",
];

impl<'a> EmitCtx<'a> {
    pub fn is_cstring(&self, ty: &AbstractType) -> bool {
        let entry = self.ts.entry(ty.entry);
        entry.is_primitive() && entry.qualified_cpp_name == "char" && ty.indirections == 1
    }

    pub fn is_void_pointer(&self, ty: &AbstractType) -> bool {
        let entry = self.ts.entry(ty.entry);
        entry.is_primitive() && entry.qualified_cpp_name == "void" && ty.indirections == 1
    }

    pub fn is_wrapper_entry(&self, entry: TypeEntryId) -> bool {
        let e = self.ts.entry(entry);
        if !e.is_complex() {
            return false;
        }
        match self.model.find_class_by_entry(entry) {
            Some(class) => !self.model.class(class).is_namespace,
            None => true,
        }
    }

    pub fn is_wrapper_type(&self, ty: &AbstractType) -> bool {
        self.is_wrapper_entry(ty.entry)
    }

    pub fn is_pointer_to_wrapper(&self, ty: &AbstractType) -> bool {
        self.is_wrapper_entry(ty.entry) && ty.indirections > 0
    }

    /// Whether the argument conversion materialises a pointer that the
    /// call site must dereference (the C++ parameter wants the object
    /// itself, by value or reference).
    pub fn should_dereference_when_passing(&self, ty: &AbstractType) -> bool {
        self.is_wrapper_entry(ty.entry) && ty.indirections == 0
    }

    pub fn is_cpp_integral_primitive(&self, ty: &AbstractType) -> bool {
        let entry = self.ts.entry(self.ts.basic_aliased_entry(ty.entry));
        entry.is_cpp_primitive()
            && python_primitive_name(&entry.qualified_cpp_name)
                .map_or(false, |n| n == "PyInt" || n == "PyLong" || n == "SbkChar")
    }

    pub fn is_number_entry(&self, entry: TypeEntryId) -> bool {
        let e = self.ts.entry(self.ts.basic_aliased_entry(entry));
        if !e.is_primitive() {
            return false;
        }
        matches!(
            python_primitive_name(&e.qualified_cpp_name),
            Some("PyInt") | Some("PyFloat") | Some("PyLong") | Some("PyBool")
        )
    }

    pub fn is_py_int(&self, ty: &AbstractType) -> bool {
        let e = self.ts.entry(self.ts.basic_aliased_entry(ty.entry));
        e.is_primitive() && python_primitive_name(&e.qualified_cpp_name) == Some("PyInt")
    }

    /// The value type has a copy constructor but no other usable
    /// constructor, so locals of it must be held behind a pointer.
    pub fn is_value_type_with_copy_ctor_only(&self, entry: TypeEntryId) -> bool {
        if !self.ts.entry(entry).is_value_type() {
            return false;
        }
        let Some(class_id) = self.model.find_class_by_entry(entry) else {
            return false;
        };
        let class = self.model.class(class_id);
        let mut has_copy = false;
        let mut has_other = false;
        for &fid in &class.functions {
            let func = self.model.function(fid);
            if !func.flags.is_constructor || func.flags.is_private {
                continue;
            }
            if func.flags.is_copy_constructor {
                has_copy = true;
            } else {
                has_other = true;
            }
        }
        has_copy && !has_other
    }

    /// The disjoint category of `ty`. Everything downstream branches on
    /// this instead of re-deriving pointer/entry combinations.
    pub fn classify(&self, ty: &AbstractType) -> TypeCategory {
        if self.is_cstring(ty) {
            return TypeCategory::CString;
        }
        if self.is_void_pointer(ty) {
            return TypeCategory::VoidPointer;
        }
        let entry = self.ts.entry(ty.entry);
        match &entry.kind {
            TypeEntryKind::Primitive { is_cpp_builtin, .. } => {
                if *is_cpp_builtin {
                    TypeCategory::CppPrimitive
                } else {
                    TypeCategory::UserPrimitive
                }
            }
            TypeEntryKind::Enum { .. } => TypeCategory::Enum,
            TypeEntryKind::Flags { .. } => TypeCategory::Flags,
            TypeEntryKind::Container { kind } => TypeCategory::Container(*kind),
            TypeEntryKind::Custom => TypeCategory::Custom,
            TypeEntryKind::Complex(data) => {
                if ty.indirections > 0 {
                    TypeCategory::PointerToWrapper
                } else if data.is_object_type {
                    TypeCategory::WrapperObject
                } else {
                    TypeCategory::WrapperValue
                }
            }
        }
    }

    /// A minimal C++ expression that constructs a value of `ty`, used to
    /// initialise locals before conversion. `None` means no such
    /// expression exists and the caller must emit an `#error`.
    pub fn minimal_constructor(&self, ty: &AbstractType) -> Option<String> {
        if ty.is_reference && self.ts.entry(ty.entry).is_object_type() {
            return None;
        }
        let entry = self.ts.entry(ty.entry);
        if entry.is_container() {
            return Some(format!(
                "::{}()",
                ty.cpp_signature_without_modifiers(self.ts)
            ));
        }
        if ty.indirections > 0 {
            return Some(format!("((::{}*)0)", entry.qualified_cpp_name));
        }
        if entry.is_complex() {
            if let Some(data) = entry.complex_data() {
                if let Some(ctor) = &data.default_constructor {
                    return Some(ctor.clone());
                }
            }
            return self.minimal_class_constructor(self.model.find_class_by_entry(ty.entry)?);
        }
        self.minimal_entry_constructor(ty.entry)
    }

    pub fn minimal_entry_constructor(&self, entry_id: TypeEntryId) -> Option<String> {
        let entry = self.ts.entry(entry_id);
        match &entry.kind {
            TypeEntryKind::Primitive {
                is_cpp_builtin,
                default_constructor,
                ..
            } => {
                if *is_cpp_builtin {
                    Some(format!("(({})0)", entry.qualified_cpp_name))
                } else if let Some(ctor) = default_constructor {
                    Some(ctor.clone())
                } else {
                    // A user primitive without a declared constructor
                    // gets the empty constructor; if that is wrong the
                    // build of the generated bindings will say so.
                    Some(format!("::{}()", entry.qualified_cpp_name))
                }
            }
            TypeEntryKind::Enum { .. } | TypeEntryKind::Flags { .. } => {
                Some(format!("((::{})0)", entry.qualified_cpp_name))
            }
            TypeEntryKind::Complex(data) => {
                if let Some(ctor) = &data.default_constructor {
                    return Some(ctor.clone());
                }
                self.minimal_class_constructor(self.model.find_class_by_entry(entry_id)?)
            }
            _ => None,
        }
    }

    /// Search a class's constructors for a minimal construction recipe:
    /// the default constructor first, then arity-ascending constructors
    /// whose arguments are all primitives/enums/pointers, then the same
    /// sweep allowing recursive value construction. Self-typed arguments
    /// break the candidate to avoid loops.
    fn minimal_class_constructor(&self, class_id: ClassId) -> Option<String> {
        let class = self.model.class(class_id);
        let qualified = &class.qualified_cpp_name;
        let ctors: Vec<_> = class
            .functions
            .iter()
            .map(|&fid| self.model.function(fid))
            .filter(|f| {
                f.flags.is_constructor
                    && !f.flags.is_user_added
                    && !f.flags.is_private
                    && !f.flags.is_copy_constructor
            })
            .collect();

        let mut max_args = 0;
        for ctor in &ctors {
            if ctor.arguments.is_empty()
                || ctor.arguments.iter().all(|a| a.has_default_value())
            {
                return Some(format!("::{}()", qualified));
            }
            max_args = max_args.max(ctor.arguments.len());
        }
        if ctors.is_empty() {
            // An implicit default constructor.
            return Some(format!("::{}()", qualified));
        }

        let mut candidates = Vec::new();
        for arity in 1..=max_args {
            'ctor: for ctor in &ctors {
                if ctor.arguments.len() != arity {
                    continue;
                }
                let mut args = Vec::new();
                for arg in &ctor.arguments {
                    if arg.ty.entry == class.entry {
                        continue 'ctor;
                    }
                    let entry = self.ts.entry(arg.ty.entry);
                    if !(entry.is_cpp_primitive() || entry.is_enum() || arg.ty.indirections > 0)
                    {
                        candidates.push(*ctor);
                        continue 'ctor;
                    }
                    args.push(self.minimal_constructor(&arg.ty)?);
                }
                return Some(format!("::{}({})", qualified, args.join(", ")));
            }
        }

        // Second pass: allow value types and user primitives, built
        // recursively.
        'candidate: for ctor in candidates {
            let mut args = Vec::new();
            for arg in &ctor.arguments {
                if arg.ty.entry == class.entry {
                    continue 'candidate;
                }
                match self.minimal_constructor(&arg.ty) {
                    Some(expr) => args.push(expr),
                    None => continue 'candidate,
                }
            }
            if !args.is_empty() {
                return Some(format!("::{}({})", qualified, args.join(", ")));
            }
        }
        None
    }
}

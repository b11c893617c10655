// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use serde::{Deserialize, Serialize};

use crate::ids::TypeEntryId;
use crate::modifications::CodeSnip;

/// Whether wrapper code is emitted for a type in this module, or the type
/// is only referenced (wrappers live in another module, or nowhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapperGeneration {
    TargetLang,
    Nothing,
}

/// A header the emitted code must include to see the C++ declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    pub file: String,
    pub is_system: bool,
}

impl Include {
    pub fn statement(&self) -> String {
        if self.is_system {
            format!("#include <{}>", self.file)
        } else {
            format!("#include \"{}\"", self.file)
        }
    }
}

/// Tri-state copyability as declared (or not) by the type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Copyable {
    Unknown,
    CopyableSet,
    NonCopyableSet,
}

/// The container flavours understood by the generator. The kind selects
/// the default conversion snippet and influences overload sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    List,
    StringList,
    LinkedList,
    Vector,
    Stack,
    Queue,
    Set,
    Pair,
    Map,
    MultiMap,
    Hash,
    MultiHash,
}

/// One user-supplied Python-to-C++ conversion alternative.
///
/// Either `source_type` names a type-system entry whose Python type is
/// checked, or `source_type_name` names a Python type directly (e.g.
/// "PyLong"); `source_type_check` optionally overrides the generated
/// check expression (with `%in` bound to the Python object).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetToNativeConversion {
    pub source_type: Option<TypeEntryId>,
    pub source_type_name: Option<String>,
    pub source_type_check: Option<String>,
    pub conversion: String,
}

/// A user-defined bidirectional conversion attached to a type entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomConversion {
    pub native_to_target: String,
    pub target_to_native: Vec<TargetToNativeConversion>,
    /// Suppresses the generator-inferred implicit conversions when set.
    pub replace_original_target_to_native: bool,
}

/// Extra data carried by class and namespace entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexData {
    /// Object types are held by pointer and never copied; value types are
    /// held by value and must be copy-constructible.
    pub is_object_type: bool,
    pub copyable: Copyable,
    /// Non-null iff this type is a typedef of a container instantiation.
    pub base_container: Option<TypeEntryId>,
    pub polymorphic_id_value: Option<String>,
    pub default_constructor: Option<String>,
    pub hash_function: Option<String>,
    /// The class can render itself as a string (drives `__repr__`).
    pub to_string_capability: bool,
    pub code_snips: Vec<CodeSnip>,
}

impl Default for ComplexData {
    fn default() -> Self {
        ComplexData {
            is_object_type: false,
            copyable: Copyable::Unknown,
            base_container: None,
            polymorphic_id_value: None,
            default_constructor: None,
            hash_function: None,
            to_string_capability: false,
            code_snips: Vec::new(),
        }
    }
}

/// The tagged variants of a type-system entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeEntryKind {
    Primitive {
        /// A C++ built-in (numeric, bool, char...) as opposed to a
        /// user-declared primitive such as a typedef'd handle.
        is_cpp_builtin: bool,
        /// Follow this chain to the entry whose converter is reused.
        aliased_to: Option<TypeEntryId>,
        default_constructor: Option<String>,
    },
    Enum {
        flags: Option<TypeEntryId>,
        value_names: Vec<String>,
        rejected_values: Vec<String>,
    },
    Flags {
        originator: TypeEntryId,
    },
    Complex(ComplexData),
    Container {
        kind: ContainerKind,
    },
    Custom,
}

/// The type-system description of a named type. Everything the generator
/// knows about a type that is not derivable from its uses in signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub qualified_cpp_name: String,
    /// The Python-visible name (defaults to the last C++ name segment).
    pub target_lang_name: String,
    /// The Python package the wrapper lives in, e.g. "sample" or
    /// "PySide.QtCore". Types from other packages are referenced through
    /// their module's exported type array.
    pub package: String,
    pub generation: WrapperGeneration,
    pub include: Option<Include>,
    pub extra_includes: Vec<Include>,
    pub custom_conversion: Option<CustomConversion>,
    pub kind: TypeEntryKind,
}

impl TypeEntry {
    pub fn name(&self) -> &str {
        self.qualified_cpp_name
            .rsplit("::")
            .next()
            .unwrap_or(&self.qualified_cpp_name)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeEntryKind::Primitive { .. })
    }

    pub fn is_cpp_primitive(&self) -> bool {
        matches!(
            self.kind,
            TypeEntryKind::Primitive {
                is_cpp_builtin: true,
                ..
            }
        )
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeEntryKind::Enum { .. })
    }

    pub fn is_flags(&self) -> bool {
        matches!(self.kind, TypeEntryKind::Flags { .. })
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, TypeEntryKind::Complex(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, TypeEntryKind::Container { .. })
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.kind, TypeEntryKind::Custom)
    }

    pub fn is_object_type(&self) -> bool {
        matches!(
            &self.kind,
            TypeEntryKind::Complex(data) if data.is_object_type
        )
    }

    pub fn is_value_type(&self) -> bool {
        matches!(
            &self.kind,
            TypeEntryKind::Complex(data) if !data.is_object_type
        )
    }

    pub fn complex_data(&self) -> Option<&ComplexData> {
        match &self.kind {
            TypeEntryKind::Complex(data) => Some(data),
            _ => None,
        }
    }

    pub fn container_kind(&self) -> Option<ContainerKind> {
        match self.kind {
            TypeEntryKind::Container { kind } => Some(kind),
            _ => None,
        }
    }

    pub fn generate_wrapper(&self) -> bool {
        self.generation == WrapperGeneration::TargetLang
    }
}

// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::ids::{ClassId, EnumId, FunctionId, TypeEntryId};
use crate::modifications::{FunctionModifications, Language, SnipPosition};
use crate::typesystem::TypeSystem;

/// A use of a type in a signature: a type entry plus the pointer,
/// reference and const decorations of that particular use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractType {
    pub entry: TypeEntryId,
    pub indirections: u8,
    pub is_reference: bool,
    pub is_constant: bool,
    /// Template arguments, for container uses.
    pub instantiations: Vec<AbstractType>,
    pub array_element: Option<Box<AbstractType>>,
    pub original_template: Option<Box<AbstractType>>,
}

impl AbstractType {
    pub fn plain(entry: TypeEntryId) -> Self {
        AbstractType {
            entry,
            indirections: 0,
            is_reference: false,
            is_constant: false,
            instantiations: Vec::new(),
            array_element: None,
            original_template: None,
        }
    }

    pub fn pointer(entry: TypeEntryId) -> Self {
        AbstractType {
            indirections: 1,
            ..Self::plain(entry)
        }
    }

    pub fn const_ref(entry: TypeEntryId) -> Self {
        AbstractType {
            is_reference: true,
            is_constant: true,
            ..Self::plain(entry)
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.indirections > 0
    }

    pub fn has_instantiations(&self) -> bool {
        !self.instantiations.is_empty()
    }

    /// The C++ spelling of this type use, e.g. `const QList<int > &`.
    pub fn cpp_signature(&self, ts: &TypeSystem) -> String {
        let mut s = String::new();
        if self.is_constant {
            s.push_str("const ");
        }
        s.push_str(&ts.entry(self.entry).qualified_cpp_name);
        if self.has_instantiations() {
            let inner = self
                .instantiations
                .iter()
                .map(|i| i.cpp_signature(ts))
                .join(", ");
            s.push('<');
            s.push_str(&inner);
            s.push_str(" >");
        }
        for _ in 0..self.indirections {
            s.push('*');
        }
        if self.is_reference {
            s.push('&');
        }
        s
    }

    /// Signature without const/reference decorations; pointers kept.
    pub fn cpp_signature_without_modifiers(&self, ts: &TypeSystem) -> String {
        let bare = AbstractType {
            is_constant: false,
            is_reference: false,
            ..self.clone()
        };
        bare.cpp_signature(ts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub ty: AbstractType,
    /// The default-value expression after type-system replacement.
    pub default_value: Option<String>,
    pub original_default_value: Option<String>,
}

impl Argument {
    pub fn has_default_value(&self) -> bool {
        self.default_value.is_some() || self.original_default_value.is_some()
    }

    /// The effective default expression: the replaced one wins.
    pub fn effective_default(&self) -> Option<&str> {
        self.default_value
            .as_deref()
            .or(self.original_default_value.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    Binary,
    Unary,
    Comparison,
    Inplace,
    Call,
    Conversion,
}

/// Operator identity for operator-overload functions. `symbol` is the
/// C++ token following `operator`, e.g. "+", "==", "()".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub symbol: String,
    pub kind: OperatorKind,
    /// The argument order is swapped relative to the C++ declaration
    /// (right-hand operand is the owner class).
    pub is_reverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionFlags {
    pub is_constructor: bool,
    pub is_copy_constructor: bool,
    pub is_explicit: bool,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub is_protected: bool,
    pub is_private: bool,
    pub is_signal: bool,
    pub is_slot: bool,
    pub is_constant: bool,
    pub is_deprecated: bool,
    pub is_user_added: bool,
    pub is_modified_removed: bool,
    pub allow_thread: bool,
}

/// A method, constructor, operator or free function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntity {
    /// Original C++ name (`operator+` for operators).
    pub name: String,
    /// Stable identity across modifications, e.g. `method(int,double)`.
    pub minimal_signature: String,
    pub owner_class: Option<ClassId>,
    pub implementing_class: Option<ClassId>,
    pub declaring_class: Option<ClassId>,
    pub arguments: Vec<Argument>,
    /// Absent means void.
    pub return_type: Option<AbstractType>,
    pub flags: FunctionFlags,
    pub operator: Option<OperatorInfo>,
    pub modifications: FunctionModifications,
}

impl FunctionEntity {
    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }

    pub fn is_operator_overload(&self) -> bool {
        self.operator.is_some()
    }

    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            &self.operator,
            Some(op) if op.kind == OperatorKind::Comparison
        )
    }

    pub fn is_binary_operator(&self) -> bool {
        matches!(&self.operator, Some(op) if op.kind == OperatorKind::Binary)
    }

    pub fn is_unary_operator(&self) -> bool {
        matches!(&self.operator, Some(op) if op.kind == OperatorKind::Unary)
    }

    pub fn is_inplace_operator(&self) -> bool {
        matches!(&self.operator, Some(op) if op.kind == OperatorKind::Inplace)
    }

    pub fn is_call_operator(&self) -> bool {
        matches!(&self.operator, Some(op) if op.kind == OperatorKind::Call)
    }

    pub fn is_conversion_operator(&self) -> bool {
        matches!(
            &self.operator,
            Some(op) if op.kind == OperatorKind::Conversion
        )
    }

    pub fn is_reverse_operator(&self) -> bool {
        matches!(&self.operator, Some(op) if op.is_reverse)
    }

    pub fn has_injected_code(&self) -> bool {
        !self.modifications.code_snips.is_empty()
    }

    /// Whether the injected code replaces the generated C++ call: true if
    /// any target snippet sits at the position the call would occupy.
    pub fn injected_code_calls_cpp_function(&self) -> bool {
        self.modifications
            .snips(SnipPosition::Any, Language::Target)
            .count()
            == 0
            && self
                .modifications
                .snips(SnipPosition::Beginning, Language::Target)
                .chain(self.modifications.snips(SnipPosition::End, Language::Target))
                .any(|s| s.code.contains("%0") || s.code.contains("%FUNCTION_NAME"))
    }

    /// 1-based argument removal check, matching type-system indices.
    pub fn argument_removed(&self, index: usize) -> bool {
        self.modifications.is_removed(index)
    }

    pub fn type_replaced(&self, index: usize) -> Option<&str> {
        self.modifications.replaced_type(index)
    }

    pub fn conversion_rule(&self, language: Language, index: usize) -> Option<&str> {
        self.modifications.conversion_rule(language, index)
    }

    pub fn removed_argument_count(&self) -> usize {
        (1..=self.arguments.len())
            .filter(|i| self.argument_removed(*i))
            .count()
    }

    /// Removed arguments up to and including original position `upto`
    /// (0-based, exclusive of later positions).
    pub fn removed_arguments_before(&self, upto: usize) -> usize {
        (1..=upto.min(self.arguments.len()))
            .filter(|i| self.argument_removed(*i))
            .count()
    }

    /// Arguments visible to Python, in order.
    pub fn visible_arguments(&self) -> impl Iterator<Item = (usize, &Argument)> {
        self.arguments
            .iter()
            .enumerate()
            .filter(move |(i, _)| !self.argument_removed(i + 1))
    }

    pub fn visible_argument_count(&self) -> usize {
        self.arguments.len() - self.removed_argument_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: AbstractType,
    pub is_static: bool,
    pub is_protected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// A C++ enum, either class-scoped or global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntity {
    pub entry: TypeEntryId,
    pub owner_class: Option<ClassId>,
    pub values: Vec<EnumValue>,
    pub is_anonymous: bool,
    pub is_protected: bool,
}

/// A C++ class or namespace with everything the generator needs to wrap it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntity {
    pub entry: TypeEntryId,
    pub name: String,
    pub qualified_cpp_name: String,
    pub package: String,
    pub enclosing_class: Option<ClassId>,
    pub base_classes: Vec<ClassId>,
    pub is_namespace: bool,
    pub is_polymorphic: bool,
    pub is_abstract: bool,
    pub has_virtual_destructor: bool,
    pub has_private_destructor: bool,
    pub has_protected_destructor: bool,
    pub is_qobject: bool,
    pub functions: Vec<FunctionId>,
    pub fields: Vec<Field>,
    pub enums: Vec<EnumId>,
    pub inner_classes: Vec<ClassId>,
}

impl ClassEntity {
    pub fn has_protected_fields(&self) -> bool {
        self.fields.iter().any(|f| f.is_protected)
    }
}

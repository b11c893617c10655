// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Single source of truth for every generated identifier: Python type
//! names, converter function names, index variables and file names.
//! Everything here is a pure function of the input model, so identical
//! inputs always mangle to identical identifiers.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use sbkgen_model::{
    AbstractType, ClassEntity, ContainerKind, FunctionEntity, TypeEntryId, TypeEntryKind,
};

use super::classify::python_primitive_name;
use super::EmitCtx;

/// Python special-method stem for each C++ operator token.
static PYTHON_OPERATORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("operator()", "call");
    m.insert("operator+", "add");
    m.insert("operator-", "sub");
    m.insert("operator*", "mul");
    m.insert("operator/", "div");
    m.insert("operator%", "mod");
    m.insert("operator+=", "iadd");
    m.insert("operator-=", "isub");
    m.insert("operator++", "iadd");
    m.insert("operator--", "isub");
    m.insert("operator*=", "imul");
    m.insert("operator/=", "idiv");
    m.insert("operator%=", "imod");
    m.insert("operator&", "and");
    m.insert("operator^", "xor");
    m.insert("operator|", "or");
    m.insert("operator<<", "lshift");
    m.insert("operator>>", "rshift");
    m.insert("operator~", "invert");
    m.insert("operator&=", "iand");
    m.insert("operator^=", "ixor");
    m.insert("operator|=", "ior");
    m.insert("operator<<=", "ilshift");
    m.insert("operator>>=", "irshift");
    m.insert("operator==", "eq");
    m.insert("operator!=", "ne");
    m.insert("operator<", "lt");
    m.insert("operator>", "gt");
    m.insert("operator<=", "le");
    m.insert("operator>=", "ge");
    m
});

/// Flatten a C++ type spelling into an identifier fragment.
pub fn fixed_name(type_name: &str) -> String {
    type_name
        .replace(' ', "")
        .replace('.', "_")
        .replace(',', "_")
        .replace('<', "_")
        .replace('>', "_")
        .replace("::", "_")
        .replace('*', "PTR")
        .replace('&', "REF")
}

pub fn module_var_base(package: &str) -> String {
    format!("Sbk{}", package.replace('.', "_"))
}

/// The per-module array of Python type objects, e.g. `SbkSampleTypes`.
pub fn cpp_api_variable_name(package: &str) -> String {
    format!("{}Types", module_var_base(package))
}

/// The per-module array of converters, e.g. `SbkSampleTypeConverters`.
pub fn converters_variable_name(package: &str) -> String {
    format!("{}TypeConverters", module_var_base(package))
}

impl<'a> EmitCtx<'a> {
    /// Mangle a type entry (or an explicit spelling of it) into the
    /// identifier fragment used in converter and index names. Types not
    /// generated in this module carry their package as a prefix.
    pub fn fixed_type_name_entry(&self, entry_id: TypeEntryId, spelling: Option<&str>) -> String {
        let entry = self.ts.entry(entry_id);
        let name = spelling.unwrap_or(&entry.qualified_cpp_name);
        if !entry.generate_wrapper() && !entry.package.is_empty() {
            fixed_name(&format!("{}_{}", entry.package, name))
        } else {
            fixed_name(name)
        }
    }

    pub fn fixed_type_name(&self, ty: &AbstractType) -> String {
        self.fixed_type_name_entry(ty.entry, Some(&ty.cpp_signature(self.ts)))
    }

    /// `SBK_<TYPE>_IDX` for a wrapper/enum/flags entry. C++ primitive
    /// aliases resolve to the aliased entry first.
    pub fn type_index_variable_entry(&self, entry_id: TypeEntryId) -> String {
        let resolved = self.ts.basic_aliased_entry(entry_id);
        let entry = self.ts.entry(resolved);
        format!(
            "SBK_{}_IDX",
            fixed_name(&entry.qualified_cpp_name).to_uppercase()
        )
    }

    /// Index variable for an instantiated container, which carries the
    /// module name and every instantiation in its identifier.
    pub fn type_index_variable(&self, ty: &AbstractType) -> String {
        if self.ts.entry(ty.entry).is_container() {
            format!(
                "SBK_{}{}_IDX",
                self.ts.module_name.to_uppercase(),
                self.instantiations_variable_fragment(ty)
            )
        } else {
            self.type_index_variable_entry(ty.entry)
        }
    }

    fn instantiations_variable_fragment(&self, ty: &AbstractType) -> String {
        let mut res = format!(
            "_{}",
            fixed_name(&self.ts.entry(ty.entry).qualified_cpp_name).to_uppercase()
        );
        for inst in &ty.instantiations {
            res.push_str(&self.instantiations_variable_fragment(inst));
        }
        res
    }

    /// `Sbk_<Name>` family base for a type; primitives map to their
    /// CPython API family, containers to the protocol they satisfy.
    pub fn py_base_name_entry(&self, entry_id: TypeEntryId) -> String {
        let entry = self.ts.entry(entry_id);
        let base = match &entry.kind {
            TypeEntryKind::Complex(_) => format!("Sbk_{}", entry.name()),
            TypeEntryKind::Primitive { .. } => {
                let resolved = self.ts.entry(self.ts.basic_aliased_entry(entry_id));
                python_primitive_name(&resolved.qualified_cpp_name)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| resolved.target_lang_name.clone())
            }
            TypeEntryKind::Enum { .. } => self.enum_flags_python_name(entry_id),
            TypeEntryKind::Flags { .. } => self.enum_flags_python_name(entry_id),
            TypeEntryKind::Container { kind } => match kind {
                ContainerKind::Set => "PySet".to_string(),
                ContainerKind::Map
                | ContainerKind::MultiMap
                | ContainerKind::Hash
                | ContainerKind::MultiHash => "PyDict".to_string(),
                _ => "PySequence".to_string(),
            },
            TypeEntryKind::Custom => "PyObject".to_string(),
        };
        base.replace("::", "_")
    }

    pub fn py_base_name(&self, ty: &AbstractType) -> String {
        if self.is_cstring(ty) {
            return "PyString".to_string();
        }
        self.py_base_name_entry(ty.entry)
    }

    /// The static Python type object identifier, e.g. `Sbk_Point_Type`.
    pub fn py_type_name_entry(&self, entry_id: TypeEntryId) -> String {
        format!("{}_Type", self.py_base_name_entry(entry_id))
    }

    pub fn py_type_name(&self, class: &ClassEntity) -> String {
        self.py_type_name_entry(class.entry)
    }

    /// `Sbk<Package>_<Qualified>` for enums and flags.
    fn enum_flags_python_name(&self, entry_id: TypeEntryId) -> String {
        let entry = self.ts.entry(entry_id);
        let package = if entry.package.is_empty() {
            self.ts.package.clone()
        } else {
            entry.package.clone()
        };
        format!(
            "Sbk{}_{}",
            package.replace('.', "_"),
            entry.qualified_cpp_name.replace("::", "_")
        )
    }

    /// The cross-module spelling of a type object: an indexed load from
    /// the owning module's exported type array.
    pub fn py_type_object_ext_entry(&self, entry_id: TypeEntryId) -> String {
        let entry = self.ts.entry(entry_id);
        let package = if entry.package.is_empty() {
            &self.ts.package
        } else {
            &entry.package
        };
        format!(
            "{}[{}]",
            cpp_api_variable_name(package),
            self.type_index_variable_entry(entry_id)
        )
    }

    pub fn py_type_object_ext(&self, ty: &AbstractType) -> String {
        let entry = self.ts.entry(ty.entry);
        let package = if entry.package.is_empty() {
            &self.ts.package
        } else {
            &entry.package
        };
        format!(
            "{}[{}]",
            cpp_api_variable_name(package),
            self.type_index_variable(ty)
        )
    }

    /// The converter handle for a type, used in registration and in
    /// emitted type checks.
    pub fn converter_object_entry(&self, entry_id: TypeEntryId) -> String {
        let entry = self.ts.entry(entry_id);
        if entry.is_cpp_primitive() {
            return format!(
                "Shiboken::Conversions::PrimitiveTypeConverter<{}>()",
                entry.qualified_cpp_name
            );
        }
        if entry.is_complex() || entry.is_enum() || entry.is_flags() {
            return format!("SBK_CONVERTER({})", self.py_type_object_ext_entry(entry_id));
        }
        let resolved = self.ts.basic_aliased_entry(entry_id);
        let rentry = self.ts.entry(resolved);
        if rentry.is_primitive() && !rentry.is_cpp_primitive() && rentry.custom_conversion.is_none()
        {
            return format!(
                "Shiboken::Conversions::PrimitiveTypeConverter<{}>()",
                rentry.qualified_cpp_name
            );
        }
        let package = if rentry.package.is_empty() {
            &self.ts.package
        } else {
            &rentry.package
        };
        format!(
            "{}[{}]",
            converters_variable_name(package),
            self.type_index_variable_entry(entry_id)
        )
    }

    pub fn converter_object(&self, ty: &AbstractType) -> String {
        if self.is_cstring(ty) {
            return "Shiboken::Conversions::PrimitiveTypeConverter<const char*>()".to_string();
        }
        if self.is_void_pointer(ty) {
            return "Shiboken::Conversions::PrimitiveTypeConverter<void*>()".to_string();
        }
        if self.ts.entry(ty.entry).is_container() {
            let entry = self.ts.entry(ty.entry);
            let package = if entry.package.is_empty() {
                &self.ts.package
            } else {
                &entry.package
            };
            return format!(
                "{}[{}]",
                converters_variable_name(package),
                self.type_index_variable(ty)
            );
        }
        self.converter_object_entry(ty.entry)
    }

    /// The expression extracting the stored C++ pointer from a wrapper
    /// Python object.
    pub fn wrapper_cpp_pointer(&self, entry_id: TypeEntryId, arg_name: &str) -> String {
        format!(
            "((::{}*)Shiboken::Conversions::cppPointer({}, (SbkObject*){}))",
            self.ts.entry(entry_id).qualified_cpp_name,
            self.py_type_object_ext_entry(entry_id),
            arg_name
        )
    }

    /// The C++ wrapper subclass name; inner classes flatten with `_`.
    pub fn wrapper_name(&self, class: &ClassEntity) -> String {
        if class.enclosing_class.is_some() {
            format!("{}Wrapper", class.qualified_cpp_name.replace("::", "_"))
        } else {
            format!("{}Wrapper", class.name)
        }
    }

    /// The `__<op>__` name for an operator overload. Argument-less `+`
    /// and `-` become `__pos__`/`__neg__`; reverse operators insert `r`.
    pub fn python_operator_function_name(&self, func: &FunctionEntity) -> String {
        let Some(op) = &func.operator else {
            return func.name.clone();
        };
        let stem = PYTHON_OPERATORS
            .get(format!("operator{}", op.symbol).as_str())
            .copied()
            .unwrap_or_else(|| {
                self.diags
                    .warn(format!("Unknown operator: operator{}", op.symbol));
                "UNKNOWN_OPERATOR"
            });
        let mut name = format!("__{}__", stem);
        if func.arguments.is_empty() {
            if name == "__sub__" {
                name = "__neg__".to_string();
            } else if name == "__add__" {
                name = "__pos__".to_string();
            }
        } else if op.is_reverse {
            name.insert(2, 'r');
        }
        name
    }

    pub fn python_rich_compare_id(&self, func: &FunctionEntity) -> String {
        let symbol = func
            .operator
            .as_ref()
            .map(|op| op.symbol.as_str())
            .unwrap_or_default();
        let stem = PYTHON_OPERATORS
            .get(format!("operator{}", symbol).as_str())
            .copied()
            .unwrap_or("eq");
        format!("Py_{}", stem.to_uppercase())
    }

    /// The dotted Python-visible name, used in error messages.
    pub fn full_python_function_name(&self, func: &FunctionEntity) -> String {
        let mut name = if func.is_operator_overload() {
            self.python_operator_function_name(func)
        } else {
            func.name.clone()
        };
        if let Some(owner) = func.owner_class {
            let class = self.model.class(owner);
            let full = format!("{}.{}", class.package, class.name);
            if func.flags.is_constructor {
                name = full;
            } else {
                name = format!("{}.{}", full, name);
            }
        }
        name
    }

    /// The C function Python calls for this function group.
    pub fn cpython_function_name(&self, func: &FunctionEntity) -> String {
        match func.owner_class {
            Some(owner) => {
                let base = self.py_base_name_entry(self.model.class(owner).entry);
                if func.flags.is_constructor {
                    format!("{}_Init", base)
                } else if func.is_operator_overload() {
                    format!("{}Func_{}", base, self.python_operator_function_name(func))
                } else {
                    format!("{}Func_{}", base, func.name)
                }
            }
            None => format!("Sbk{}Module_{}", self.ts.module_name, func.name),
        }
    }

    pub fn method_definition_name(&self, func: &FunctionEntity) -> String {
        match func.owner_class {
            Some(owner) => format!(
                "{}Method_{}",
                self.py_base_name_entry(self.model.class(owner).entry),
                func.name
            ),
            None => String::new(),
        }
    }

    pub fn getset_list_name(&self, class: &ClassEntity) -> String {
        format!("{}_getsetlist", self.py_base_name_entry(class.entry))
    }

    pub fn getattro_name(&self, class: &ClassEntity) -> String {
        format!("{}_getattro", self.py_base_name_entry(class.entry))
    }

    pub fn setattro_name(&self, class: &ClassEntity) -> String {
        format!("{}_setattro", self.py_base_name_entry(class.entry))
    }

    pub fn field_getter_name(&self, class: &ClassEntity, field: &str) -> String {
        format!("{}_get_{}", self.py_base_name_entry(class.entry), field)
    }

    pub fn field_setter_name(&self, class: &ClassEntity, field: &str) -> String {
        format!("{}_set_{}", self.py_base_name_entry(class.entry), field)
    }

    pub fn special_cast_function_name(&self, class: &ClassEntity) -> String {
        format!("{}SpecialCastFunction", self.py_base_name_entry(class.entry))
    }

    pub fn multiple_inheritance_init_name(&self, class: &ClassEntity) -> String {
        format!("{}_mi_init", self.py_base_name_entry(class.entry))
    }

    pub fn type_discovery_name(&self, class: &ClassEntity) -> String {
        format!("{}_typeDiscovery", self.py_base_name_entry(class.entry))
    }

    pub fn class_init_function_name(&self, class: &ClassEntity) -> String {
        format!("init_{}", class.qualified_cpp_name.replace("::", "_"))
    }

    /// `<src>_CppToPython_<dst>`; an empty destination repeats the source.
    pub fn cpp_to_python_fn(&self, source: &str, target: &str) -> String {
        let target = if target.is_empty() { source } else { target };
        format!("{}_CppToPython_{}", source, target)
    }

    pub fn python_to_cpp_fn(&self, source: &str, target: &str) -> String {
        format!("{}_PythonToCpp_{}", source, target)
    }

    pub fn is_convertible_fn(&self, source: &str, target: &str) -> String {
        format!("is_{}_PythonToCpp_{}_Convertible", source, target)
    }

    /// Output file stem for a class, e.g. `point_wrapper`.
    pub fn file_name_for_class(&self, class: &ClassEntity) -> String {
        format!(
            "{}_wrapper",
            class.qualified_cpp_name.replace("::", "_").to_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_name_mangles_every_token() {
        assert_eq!(
            fixed_name("QList<QPair<int, double> >*&"),
            "QList_QPair_int_double__PTRREF"
        );
        assert_eq!(fixed_name("Foo::Bar"), "Foo_Bar");
    }

    #[test]
    fn module_arrays_carry_the_package() {
        assert_eq!(cpp_api_variable_name("sample"), "SbksampleTypes");
        assert_eq!(
            converters_variable_name("PySide.QtCore"),
            "SbkPySide_QtCoreTypeConverters"
        );
    }
}

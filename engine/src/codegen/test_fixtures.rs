// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Shared builders for emitter tests: assemble small models the way the
//! external parser would hand them over.

use sbkgen_model::{
    AbstractType, ApiModel, Argument, ClassEntity, ClassId, ComplexData, Copyable, EnumEntity,
    FunctionEntity, FunctionFlags, FunctionId, OperatorInfo, OperatorKind, TypeEntry, TypeEntryId,
    TypeEntryKind, TypeSystem, WrapperGeneration,
};

use crate::errors::Diagnostics;
use crate::GeneratorConfig;

pub struct ModelBuilder {
    pub model: ApiModel,
    pub ts: TypeSystem,
    pub config: GeneratorConfig,
    int_entry: TypeEntryId,
    double_entry: TypeEntryId,
    bool_entry: TypeEntryId,
}

impl ModelBuilder {
    pub fn new() -> Self {
        let mut ts = TypeSystem::new("sample", "sample");
        let int_entry = ts.add_entry(cpp_primitive("int"));
        let double_entry = ts.add_entry(cpp_primitive("double"));
        let bool_entry = ts.add_entry(cpp_primitive("bool"));
        ModelBuilder {
            model: ApiModel::new(),
            ts,
            config: GeneratorConfig::default(),
            int_entry,
            double_entry,
            bool_entry,
        }
    }

    pub fn int_ty(&self) -> AbstractType {
        AbstractType::plain(self.int_entry)
    }

    pub fn double_ty(&self) -> AbstractType {
        AbstractType::plain(self.double_entry)
    }

    pub fn bool_ty(&self) -> AbstractType {
        AbstractType::plain(self.bool_entry)
    }

    fn add_complex(&mut self, name: &str, is_object: bool) -> ClassId {
        let entry = self.ts.add_entry(TypeEntry {
            qualified_cpp_name: name.to_string(),
            target_lang_name: short_name(name),
            package: "sample".to_string(),
            generation: WrapperGeneration::TargetLang,
            include: None,
            extra_includes: Vec::new(),
            custom_conversion: None,
            kind: TypeEntryKind::Complex(ComplexData {
                is_object_type: is_object,
                copyable: if is_object {
                    Copyable::NonCopyableSet
                } else {
                    Copyable::Unknown
                },
                ..ComplexData::default()
            }),
        });
        self.model.add_class(ClassEntity {
            entry,
            name: short_name(name),
            qualified_cpp_name: name.to_string(),
            package: "sample".to_string(),
            enclosing_class: None,
            base_classes: Vec::new(),
            is_namespace: false,
            is_polymorphic: is_object,
            is_abstract: false,
            has_virtual_destructor: is_object,
            has_private_destructor: false,
            has_protected_destructor: false,
            is_qobject: false,
            functions: Vec::new(),
            fields: Vec::new(),
            enums: Vec::new(),
            inner_classes: Vec::new(),
        })
    }

    pub fn value_class(&mut self, name: &str) -> ClassId {
        self.add_complex(name, false)
    }

    pub fn object_class(&mut self, name: &str) -> ClassId {
        self.add_complex(name, true)
    }

    pub fn derived_class(&mut self, name: &str, base: ClassId) -> ClassId {
        let id = self.add_complex(name, true);
        self.model.class_mut(id).base_classes.push(base);
        id
    }

    pub fn enum_type(&mut self, qualified: &str) -> AbstractType {
        let entry = self.ts.add_entry(TypeEntry {
            qualified_cpp_name: qualified.to_string(),
            target_lang_name: short_name(qualified),
            package: "sample".to_string(),
            generation: WrapperGeneration::TargetLang,
            include: None,
            extra_includes: Vec::new(),
            custom_conversion: None,
            kind: TypeEntryKind::Enum {
                flags: None,
                value_names: Vec::new(),
                rejected_values: Vec::new(),
            },
        });
        self.model.add_enum(EnumEntity {
            entry,
            owner_class: None,
            values: Vec::new(),
            is_anonymous: false,
            is_protected: false,
        });
        AbstractType::plain(entry)
    }

    pub fn class_entry(&self, class: ClassId) -> TypeEntryId {
        self.model.class(class).entry
    }

    pub fn pointer_to(&self, class: ClassId) -> AbstractType {
        AbstractType::pointer(self.class_entry(class))
    }

    pub fn value_ty(&self, class: ClassId) -> AbstractType {
        AbstractType::plain(self.class_entry(class))
    }

    pub fn const_ref_ty(&self, class: ClassId) -> AbstractType {
        AbstractType::const_ref(self.class_entry(class))
    }

    fn argument(name: &str, ty: AbstractType, default: Option<&str>) -> Argument {
        Argument {
            name: name.to_string(),
            ty,
            default_value: None,
            original_default_value: default.map(str::to_string),
        }
    }

    fn push_function(&mut self, class: Option<ClassId>, func: FunctionEntity) -> FunctionId {
        let id = self.model.add_function(func);
        match class {
            Some(c) => self.model.class_mut(c).functions.push(id),
            None => self.model.global_functions.push(id),
        }
        id
    }

    pub fn constructor(&mut self, class: ClassId, args: &[(&str, AbstractType)]) -> FunctionId {
        let class_name = self.model.class(class).name.clone();
        let arguments: Vec<_> = args
            .iter()
            .map(|(n, t)| Self::argument(n, t.clone(), None))
            .collect();
        let signature = format!(
            "{}({})",
            class_name,
            args.iter()
                .map(|(_, t)| t.cpp_signature(&self.ts))
                .collect::<Vec<_>>()
                .join(",")
        );
        self.push_function(
            Some(class),
            FunctionEntity {
                name: class_name,
                minimal_signature: signature,
                owner_class: Some(class),
                implementing_class: Some(class),
                declaring_class: Some(class),
                arguments,
                return_type: None,
                flags: FunctionFlags {
                    is_constructor: true,
                    ..Default::default()
                },
                operator: None,
                modifications: Default::default(),
            },
        )
    }

    pub fn constructor_with_defaults(
        &mut self,
        class: ClassId,
        args: &[(&str, AbstractType, Option<&str>)],
    ) -> FunctionId {
        let id = self.constructor(
            class,
            &args
                .iter()
                .map(|(n, t, _)| (*n, t.clone()))
                .collect::<Vec<_>>(),
        );
        let func = self.model.function(id).clone();
        let mut func = func;
        for (arg, (_, _, default)) in func.arguments.iter_mut().zip(args) {
            arg.original_default_value = default.map(str::to_string);
        }
        *self.function_mut(id) = func;
        id
    }

    pub fn method(
        &mut self,
        class: ClassId,
        name: &str,
        args: &[(&str, AbstractType)],
        ret: Option<AbstractType>,
    ) -> FunctionId {
        let arguments: Vec<_> = args
            .iter()
            .map(|(n, t)| Self::argument(n, t.clone(), None))
            .collect();
        let signature = format!(
            "{}({})",
            name,
            args.iter()
                .map(|(_, t)| t.cpp_signature(&self.ts))
                .collect::<Vec<_>>()
                .join(",")
        );
        self.push_function(
            Some(class),
            FunctionEntity {
                name: name.to_string(),
                minimal_signature: signature,
                owner_class: Some(class),
                implementing_class: Some(class),
                declaring_class: Some(class),
                arguments,
                return_type: ret,
                flags: FunctionFlags::default(),
                operator: None,
                modifications: Default::default(),
            },
        )
    }

    pub fn method_with_defaults(
        &mut self,
        class: ClassId,
        name: &str,
        args: &[(&str, AbstractType, Option<&str>)],
    ) -> FunctionId {
        let id = self.method(
            class,
            name,
            &args
                .iter()
                .map(|(n, t, _)| (*n, t.clone()))
                .collect::<Vec<_>>(),
            None,
        );
        let mut func = self.model.function(id).clone();
        for (arg, (_, _, default)) in func.arguments.iter_mut().zip(args) {
            arg.original_default_value = default.map(str::to_string);
        }
        *self.function_mut(id) = func;
        id
    }

    pub fn operator(
        &mut self,
        class: ClassId,
        symbol: &str,
        kind: OperatorKind,
        args: &[(&str, AbstractType)],
        ret: Option<AbstractType>,
    ) -> FunctionId {
        let id = self.method(class, &format!("operator{}", symbol), args, ret);
        let func = self.function_mut(id);
        func.operator = Some(OperatorInfo {
            symbol: symbol.to_string(),
            kind,
            is_reverse: false,
        });
        id
    }

    pub fn global_function(
        &mut self,
        name: &str,
        args: &[(&str, AbstractType)],
        ret: Option<AbstractType>,
    ) -> FunctionId {
        let arguments: Vec<_> = args
            .iter()
            .map(|(n, t)| Self::argument(n, t.clone(), None))
            .collect();
        self.push_function(
            None,
            FunctionEntity {
                name: name.to_string(),
                minimal_signature: format!("{}()", name),
                owner_class: None,
                implementing_class: None,
                declaring_class: None,
                arguments,
                return_type: ret,
                flags: FunctionFlags::default(),
                operator: None,
                modifications: Default::default(),
            },
        )
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionEntity {
        // The model hides function mutation; tests rebuild in place via
        // clone-and-swap through this helper.
        self.model.function_mut(id)
    }

    pub fn build(self) -> (ApiModel, TypeSystem, GeneratorConfig, Diagnostics) {
        (self.model, self.ts, self.config, Diagnostics::new())
    }
}

fn short_name(qualified: &str) -> String {
    qualified
        .rsplit("::")
        .next()
        .unwrap_or(qualified)
        .to_string()
}

fn cpp_primitive(name: &str) -> TypeEntry {
    TypeEntry {
        qualified_cpp_name: name.to_string(),
        target_lang_name: name.to_string(),
        package: String::new(),
        generation: WrapperGeneration::Nothing,
        include: None,
        extra_includes: Vec::new(),
        custom_conversion: None,
        kind: TypeEntryKind::Primitive {
            is_cpp_builtin: true,
            aliased_to: None,
            default_constructor: None,
        },
    }
}

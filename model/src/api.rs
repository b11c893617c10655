// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::ids::{ClassId, EnumId, FunctionId, TypeEntryId};
use crate::meta::{AbstractType, ClassEntity, EnumEntity, FunctionEntity};
use crate::typesystem::TypeSystem;

/// The parsed C++ API handed to the generator. Immutable once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiModel {
    classes: Vec<ClassEntity>,
    functions: Vec<FunctionEntity>,
    enums: Vec<EnumEntity>,
    pub global_functions: Vec<FunctionId>,
    pub global_enums: Vec<EnumId>,
}

impl ApiModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: ClassEntity) -> ClassId {
        let id = ClassId::from(self.classes.len());
        self.classes.push(class);
        id
    }

    pub fn add_function(&mut self, function: FunctionEntity) -> FunctionId {
        let id = FunctionId::from(self.functions.len());
        self.functions.push(function);
        id
    }

    pub fn add_enum(&mut self, e: EnumEntity) -> EnumId {
        let id = EnumId::from(self.enums.len());
        self.enums.push(e);
        id
    }

    pub fn class(&self, id: ClassId) -> &ClassEntity {
        &self.classes[id.index()]
    }

    /// Mutable access for model loaders; the generator never calls this.
    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassEntity {
        &mut self.classes[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionEntity {
        &self.functions[id.index()]
    }

    /// Mutable access for model loaders; the generator never calls this.
    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionEntity {
        &mut self.functions[id.index()]
    }

    pub fn enum_entity(&self, id: EnumId) -> &EnumEntity {
        &self.enums[id.index()]
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassEntity)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId::from(i), c))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn find_class(&self, qualified_cpp_name: &str) -> Option<ClassId> {
        self.classes()
            .find(|(_, c)| c.qualified_cpp_name == qualified_cpp_name)
            .map(|(id, _)| id)
    }

    pub fn find_class_by_entry(&self, entry: TypeEntryId) -> Option<ClassId> {
        self.classes()
            .find(|(_, c)| c.entry == entry)
            .map(|(id, _)| id)
    }

    pub fn find_enum_by_entry(&self, entry: TypeEntryId) -> Option<EnumId> {
        self.enums
            .iter()
            .position(|e| e.entry == entry)
            .map(EnumId::from)
    }

    /// All ancestors of `class`, nearest first, depth-first over the
    /// multiple-inheritance lattice, without repetition.
    pub fn all_ancestors(&self, class: ClassId) -> Vec<ClassId> {
        let mut seen = IndexSet::new();
        let mut stack: Vec<ClassId> = self.class(class).base_classes.clone();
        while let Some(base) = stack.pop() {
            if seen.insert(base) {
                stack.extend(self.class(base).base_classes.iter().copied());
            }
        }
        seen.into_iter().collect()
    }

    pub fn is_ancestor_of(&self, ancestor: ClassId, class: ClassId) -> bool {
        self.all_ancestors(class).contains(&ancestor)
    }

    /// Class ids in an order that puts every base before its subclasses
    /// and every enclosing class before its inner classes. Stable for a
    /// given model: ties break on arena order.
    pub fn classes_topological_sorted(&self) -> Vec<ClassId> {
        let mut order = Vec::with_capacity(self.classes.len());
        let mut emitted = vec![false; self.classes.len()];
        // Repeated sweeps over arena order until a fixpoint; the arena is
        // small enough that quadratic worst case is irrelevant here.
        loop {
            let mut progressed = false;
            for (id, class) in self.classes() {
                if emitted[id.index()] {
                    continue;
                }
                let deps_done = class
                    .base_classes
                    .iter()
                    .chain(class.enclosing_class.iter())
                    .all(|dep| emitted[dep.index()]);
                if deps_done {
                    emitted[id.index()] = true;
                    order.push(id);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        // Inheritance cycles cannot occur in valid C++; anything left is
        // a model inconsistency and is appended in arena order so the
        // caller can still report on it.
        for (id, _) in self.classes() {
            if !emitted[id.index()] {
                order.push(id);
            }
        }
        order
    }

    /// The implicit Python->C++ conversion sources for a value type:
    /// non-explicit single-argument constructors and conversion operators
    /// found anywhere in the model. User-added functions are excluded
    /// (they exist only on the Python side).
    pub fn implicit_conversions(&self, target: TypeEntryId) -> Vec<FunctionId> {
        let mut result = Vec::new();
        let Some(class_id) = self.find_class_by_entry(target) else {
            return result;
        };
        let class = self.class(class_id);
        for &fid in &class.functions {
            let func = self.function(fid);
            if func.flags.is_user_added || func.flags.is_private || func.flags.is_modified_removed
            {
                continue;
            }
            let single_arg_ctor = func.flags.is_constructor
                && !func.flags.is_explicit
                && !func.flags.is_copy_constructor
                && func.arguments.len() == 1
                && func.arguments[0].ty.entry != target;
            if single_arg_ctor {
                result.push(fid);
            }
        }
        // Conversion operators on other classes yielding this type.
        for (cid, class) in self.classes() {
            if cid == class_id {
                continue;
            }
            for &fid in &class.functions {
                let func = self.function(fid);
                if func.is_conversion_operator()
                    && !func.flags.is_user_added
                    && func.return_type.as_ref().map(|t| t.entry) == Some(target)
                {
                    result.push(fid);
                }
            }
        }
        result
    }

    /// Every distinct container instantiation reachable from an exposed
    /// signature, in first-seen order.
    pub fn all_instantiated_containers(&self, ts: &TypeSystem) -> Vec<AbstractType> {
        let mut seen: IndexMap<String, AbstractType> = IndexMap::new();
        let mut visit = |ty: &AbstractType| {
            collect_containers(ty, ts, &mut seen);
        };
        for func in &self.functions {
            if let Some(ret) = &func.return_type {
                visit(ret);
            }
            for arg in &func.arguments {
                visit(&arg.ty);
            }
        }
        for class in &self.classes {
            for field in &class.fields {
                visit(&field.ty);
            }
        }
        seen.into_iter().map(|(_, ty)| ty).collect()
    }
}

fn collect_containers(
    ty: &AbstractType,
    ts: &TypeSystem,
    seen: &mut IndexMap<String, AbstractType>,
) {
    if ts.entry(ty.entry).is_container() && ty.has_instantiations() {
        let key = ty.cpp_signature_without_modifiers(ts);
        let mut normalized = ty.clone();
        normalized.is_constant = false;
        normalized.is_reference = false;
        seen.entry(key).or_insert(normalized);
    }
    for inner in &ty.instantiations {
        collect_containers(inner, ts, seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{ComplexData, TypeEntry, TypeEntryKind, WrapperGeneration};
    use crate::meta::{Argument, FunctionFlags};

    fn complex_entry(name: &str) -> TypeEntry {
        TypeEntry {
            qualified_cpp_name: name.to_string(),
            target_lang_name: name.to_string(),
            package: "sample".to_string(),
            generation: WrapperGeneration::TargetLang,
            include: None,
            extra_includes: Vec::new(),
            custom_conversion: None,
            kind: TypeEntryKind::Complex(ComplexData::default()),
        }
    }

    fn class(entry: TypeEntryId, name: &str, bases: Vec<ClassId>) -> ClassEntity {
        ClassEntity {
            entry,
            name: name.to_string(),
            qualified_cpp_name: name.to_string(),
            package: "sample".to_string(),
            enclosing_class: None,
            base_classes: bases,
            is_namespace: false,
            is_polymorphic: false,
            is_abstract: false,
            has_virtual_destructor: true,
            has_private_destructor: false,
            has_protected_destructor: false,
            is_qobject: false,
            functions: Vec::new(),
            fields: Vec::new(),
            enums: Vec::new(),
            inner_classes: Vec::new(),
        }
    }

    #[test]
    fn topological_sort_puts_bases_first() {
        let mut ts = TypeSystem::new("sample", "sample");
        let mut model = ApiModel::new();
        let e_derived = ts.add_entry(complex_entry("Derived"));
        let e_base = ts.add_entry(complex_entry("Base"));
        // Arena order deliberately wrong way round.
        let derived = model.add_class(class(e_derived, "Derived", Vec::new()));
        let base = model.add_class(class(e_base, "Base", Vec::new()));
        model.classes[derived.index()].base_classes.push(base);

        let order = model.classes_topological_sorted();
        let base_pos = order.iter().position(|&c| c == base).unwrap();
        let derived_pos = order.iter().position(|&c| c == derived).unwrap();
        assert!(base_pos < derived_pos);
    }

    #[test]
    fn ancestors_cover_multiple_inheritance() {
        let mut ts = TypeSystem::new("sample", "sample");
        let mut model = ApiModel::new();
        let ids: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|n| {
                let e = ts.add_entry(complex_entry(n));
                model.add_class(class(e, n, Vec::new()))
            })
            .collect();
        model.classes[ids[2].index()].base_classes = vec![ids[0], ids[1]];

        let ancestors = model.all_ancestors(ids[2]);
        assert!(ancestors.contains(&ids[0]));
        assert!(ancestors.contains(&ids[1]));
        assert!(model.is_ancestor_of(ids[0], ids[2]));
        assert!(!model.is_ancestor_of(ids[2], ids[0]));
    }

    #[test]
    fn implicit_conversions_skip_explicit_and_user_added() {
        let mut ts = TypeSystem::new("sample", "sample");
        let mut model = ApiModel::new();
        let e_target = ts.add_entry(complex_entry("Target"));
        let e_int = ts.add_entry(TypeEntry {
            qualified_cpp_name: "int".into(),
            target_lang_name: "int".into(),
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
        });
        let target = model.add_class(class(e_target, "Target", Vec::new()));

        let mut ctor = FunctionEntity {
            name: "Target".into(),
            minimal_signature: "Target(int)".into(),
            owner_class: Some(target),
            implementing_class: Some(target),
            declaring_class: Some(target),
            arguments: vec![Argument {
                name: "v".into(),
                ty: AbstractType::plain(e_int),
                default_value: None,
                original_default_value: None,
            }],
            return_type: None,
            flags: FunctionFlags {
                is_constructor: true,
                ..Default::default()
            },
            operator: None,
            modifications: Default::default(),
        };
        let good = model.add_function(ctor.clone());
        ctor.flags.is_explicit = true;
        let explicit = model.add_function(ctor.clone());
        ctor.flags.is_explicit = false;
        ctor.flags.is_user_added = true;
        let user_added = model.add_function(ctor);
        model.classes[target.index()].functions = vec![good, explicit, user_added];

        let conversions = model.implicit_conversions(e_target);
        assert_eq!(conversions, vec![good]);
    }
}

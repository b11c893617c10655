// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::entries::{Include, TypeEntry, TypeEntryKind};
use crate::ids::TypeEntryId;
use crate::modifications::CodeSnip;

/// The loaded type-system description for one generated module.
///
/// The entry arena preserves declaration order; every lookup map is
/// insertion-ordered so that anything iterating entries reaches the
/// output in a stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSystem {
    entries: Vec<TypeEntry>,
    /// The Python package of this module, e.g. "sample".
    pub package: String,
    /// The module name used in generated identifiers, e.g. "sample".
    pub module_name: String,
    /// Modules whose types this one references; imported at init time.
    pub required_imports: Vec<String>,
    /// Module-level injected code (run during module init).
    pub code_snips: Vec<CodeSnip>,
    /// Extra headers included by the module translation unit.
    pub extra_includes: Vec<Include>,
    #[serde(skip)]
    by_name: std::cell::OnceCell<IndexMap<String, TypeEntryId>>,
}

impl TypeSystem {
    pub fn new(package: &str, module_name: &str) -> Self {
        TypeSystem {
            entries: Vec::new(),
            package: package.to_string(),
            module_name: module_name.to_string(),
            required_imports: Vec::new(),
            code_snips: Vec::new(),
            extra_includes: Vec::new(),
            by_name: std::cell::OnceCell::new(),
        }
    }

    pub fn add_entry(&mut self, entry: TypeEntry) -> TypeEntryId {
        assert!(
            self.by_name.get().is_none(),
            "type system is frozen once queried"
        );
        let id = TypeEntryId::from(self.entries.len());
        self.entries.push(entry);
        id
    }

    pub fn entry(&self, id: TypeEntryId) -> &TypeEntry {
        &self.entries[id.index()]
    }

    /// Mutable access for loaders patching forward references; the
    /// generator never calls this.
    pub fn entry_mut(&mut self, id: TypeEntryId) -> &mut TypeEntry {
        assert!(
            self.by_name.get().is_none(),
            "type system is frozen once queried"
        );
        &mut self.entries[id.index()]
    }

    pub fn entries(&self) -> impl Iterator<Item = (TypeEntryId, &TypeEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (TypeEntryId::from(i), e))
    }

    fn name_map(&self) -> &IndexMap<String, TypeEntryId> {
        self.by_name.get_or_init(|| {
            self.entries()
                .map(|(id, e)| (e.qualified_cpp_name.clone(), id))
                .collect()
        })
    }

    pub fn find_type(&self, qualified_cpp_name: &str) -> Option<TypeEntryId> {
        self.name_map().get(qualified_cpp_name).copied()
    }

    pub fn required_target_imports(&self) -> &[String] {
        &self.required_imports
    }

    /// All user primitives declared in this module's type system.
    pub fn primitive_types(&self) -> impl Iterator<Item = (TypeEntryId, &TypeEntry)> {
        self.entries().filter(|(_, e)| e.is_primitive())
    }

    /// Resolve a primitive through its alias chain to the entry whose
    /// converter is actually registered.
    pub fn basic_aliased_entry(&self, id: TypeEntryId) -> TypeEntryId {
        let mut current = id;
        loop {
            match &self.entry(current).kind {
                TypeEntryKind::Primitive {
                    aliased_to: Some(next),
                    ..
                } => current = *next,
                _ => return current,
            }
        }
    }

    /// Whether this entry's wrapper belongs to a different module.
    pub fn is_external(&self, id: TypeEntryId) -> bool {
        let entry = self.entry(id);
        !entry.package.is_empty() && entry.package != self.package
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::WrapperGeneration;

    fn primitive(name: &str, aliased_to: Option<TypeEntryId>) -> TypeEntry {
        TypeEntry {
            qualified_cpp_name: name.to_string(),
            target_lang_name: name.to_string(),
            package: String::new(),
            generation: WrapperGeneration::Nothing,
            include: None,
            extra_includes: Vec::new(),
            custom_conversion: None,
            kind: TypeEntryKind::Primitive {
                is_cpp_builtin: aliased_to.is_none(),
                aliased_to,
                default_constructor: None,
            },
        }
    }

    #[test]
    fn alias_chain_resolves_to_basic_entry() {
        let mut ts = TypeSystem::new("sample", "sample");
        let double = ts.add_entry(primitive("double", None));
        let qreal = ts.add_entry(primitive("qreal", Some(double)));
        let vreal = ts.add_entry(primitive("vreal", Some(qreal)));
        assert_eq!(ts.basic_aliased_entry(vreal), double);
        assert_eq!(ts.basic_aliased_entry(double), double);
    }

    #[test]
    fn find_type_by_qualified_name() {
        let mut ts = TypeSystem::new("sample", "sample");
        let id = ts.add_entry(primitive("unsigned long", None));
        assert_eq!(ts.find_type("unsigned long"), Some(id));
        assert_eq!(ts.find_type("long"), None);
    }
}

// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use serde::{Deserialize, Serialize};

/// Where an injected snippet is placed relative to the generated body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnipPosition {
    Beginning,
    Middle,
    End,
    Declaration,
    Any,
}

/// Which side of the binding a snippet or rule applies to. `Target` is the
/// Python-facing wrapper, `Native` the C++ subclass/trampoline side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    Target,
    Native,
    All,
}

impl Language {
    pub fn covers(self, other: Language) -> bool {
        self == Language::All || other == Language::All || self == other
    }
}

/// A user code fragment injected into generated wrappers or classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnip {
    pub position: SnipPosition,
    pub language: Language,
    pub code: String,
}

/// What happens to the ownership link between a wrapper and its C++
/// object after the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipAction {
    TransferToPython,
    ReleaseFromPython,
    Invalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefCountAction {
    Add,
    Set,
    Remove,
}

/// Records an arbitrary Python reference held by the wrapper, keyed by
/// the argument name (or an explicit key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCount {
    pub action: RefCountAction,
    pub key: Option<String>,
}

/// A bespoke conversion snippet replacing the default converter call for
/// one argument (or the return value) in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRule {
    pub language: Language,
    pub code: String,
}

/// Per-argument modification from the type system. Index 0 addresses the
/// return value; arguments are 1-based, matching the type-system XML.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArgumentModification {
    pub index: usize,
    pub removed: bool,
    pub replaced_type: Option<String>,
    pub replaced_default_expression: Option<String>,
    pub target_ownership: Option<OwnershipAction>,
    pub native_ownership: Option<OwnershipAction>,
    pub reference_count: Option<ReferenceCount>,
    pub conversion_rules: Vec<ConversionRule>,
    /// Explicit parent link: parent the object at `index` to the object
    /// at this argument index.
    pub parent_index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionModifications {
    pub arg_mods: Vec<ArgumentModification>,
    pub code_snips: Vec<CodeSnip>,
}

impl FunctionModifications {
    pub fn arg_mod(&self, index: usize) -> Option<&ArgumentModification> {
        self.arg_mods.iter().find(|m| m.index == index)
    }

    pub fn is_removed(&self, index: usize) -> bool {
        self.arg_mod(index).map_or(false, |m| m.removed)
    }

    pub fn replaced_type(&self, index: usize) -> Option<&str> {
        self.arg_mod(index)
            .and_then(|m| m.replaced_type.as_deref())
    }

    /// The bespoke conversion snippet for `index` in `language`, if any.
    pub fn conversion_rule(&self, language: Language, index: usize) -> Option<&str> {
        self.arg_mod(index).and_then(|m| {
            m.conversion_rules
                .iter()
                .find(|r| r.language.covers(language))
                .map(|r| r.code.as_str())
        })
    }

    pub fn has_conversion_rule(&self, language: Language, index: usize) -> bool {
        self.conversion_rule(language, index).is_some()
    }

    pub fn snips(
        &self,
        position: SnipPosition,
        language: Language,
    ) -> impl Iterator<Item = &CodeSnip> {
        self.code_snips.iter().filter(move |s| {
            (s.position == position || s.position == SnipPosition::Any)
                && s.language.covers(language)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_rule_respects_language() {
        let mods = FunctionModifications {
            arg_mods: vec![ArgumentModification {
                index: 1,
                conversion_rules: vec![ConversionRule {
                    language: Language::Native,
                    code: "%out = fromNative(%in);".into(),
                }],
                ..Default::default()
            }],
            code_snips: Vec::new(),
        };
        assert!(mods.has_conversion_rule(Language::Native, 1));
        assert!(!mods.has_conversion_rule(Language::Target, 1));
        assert!(!mods.has_conversion_rule(Language::Native, 2));
    }

    #[test]
    fn all_language_covers_both_sides() {
        assert!(Language::All.covers(Language::Target));
        assert!(Language::Target.covers(Language::All));
        assert!(!Language::Target.covers(Language::Native));
    }
}

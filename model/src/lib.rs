// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The read-only input boundary of the binding generator: a parsed C++ API
//! model (`ApiModel`) and a type-system description (`TypeSystem`).
//!
//! Both are produced outside this workspace (by a C++ header parser and a
//! type-system loader respectively) and handed to `sbkgen-engine` as data.
//! Entities live in typed arenas and cross-reference each other through
//! opaque indices, so the generator can walk the graph without chasing
//! pointers or worrying about ownership cycles.

mod api;
mod entries;
mod ids;
mod meta;
mod modifications;
mod typesystem;

pub use api::ApiModel;
pub use entries::{
    ComplexData, ContainerKind, Copyable, CustomConversion, Include, TargetToNativeConversion,
    TypeEntry, TypeEntryKind, WrapperGeneration,
};
pub use ids::{ClassId, EnumId, FunctionId, TypeEntryId};
pub use meta::{
    AbstractType, Argument, ClassEntity, EnumEntity, EnumValue, Field, FunctionEntity,
    FunctionFlags, OperatorInfo, OperatorKind,
};
pub use modifications::{
    ArgumentModification, CodeSnip, FunctionModifications, Language, OwnershipAction,
    RefCountAction, ReferenceCount, SnipPosition,
};
pub use typesystem::TypeSystem;

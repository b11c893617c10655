// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(i: usize) -> Self {
                Self(i as u32)
            }
        }
    };
}

define_id! {
    /// Index of a `ClassEntity` in the `ApiModel` class arena.
    ClassId
}
define_id! {
    /// Index of a `FunctionEntity` in the `ApiModel` function arena.
    FunctionId
}
define_id! {
    /// Index of an `EnumEntity` in the `ApiModel` enum arena.
    EnumId
}
define_id! {
    /// Index of a `TypeEntry` in the `TypeSystem` entry arena.
    TypeEntryId
}

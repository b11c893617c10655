// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! sbkgen: a binding generator core. Given a parsed C++ API model and a
//! type-system description, it emits the C++ source of a CPython
//! extension module exposing that API, ready to compile against the
//! Shiboken runtime support library.
//!
//! This crate is a thin facade; the machinery lives in
//! [`sbkgen_engine`] and the input data model in [`sbkgen_model`].
//!
//! ```no_run
//! use sbkgen::{generate, write_to_directory, GeneratorConfig};
//! use sbkgen_model::{ApiModel, TypeSystem};
//!
//! # fn load() -> (ApiModel, TypeSystem) { unimplemented!() }
//! let (model, type_system) = load();
//! let config = GeneratorConfig::default();
//! let bindings = generate(&model, &type_system, &config).unwrap();
//! write_to_directory(&bindings, std::path::Path::new("generated")).unwrap();
//! ```

pub use sbkgen_engine::{
    generate, write_to_directory, Diagnostics, GenError, GeneratedBindings, GeneratedFile,
    GeneratorConfig, Warning, WriteOutcome,
};
pub use sbkgen_model as model;

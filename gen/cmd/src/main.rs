// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The embedding driver: loads a serialized `(ApiModel, TypeSystem)`
//! project dump, runs the generator core, and commits the emitted files
//! under the output directory. Exits non-zero on any fatal generator
//! error; warnings are summarised but do not change the exit code.

use clap::{App, Arg};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::process;

use sbkgen_engine::{generate, write_to_directory, GeneratorConfig};
use sbkgen_model::{ApiModel, TypeSystem};

/// The on-disk project shape produced by the external parser and
/// type-system loader.
#[derive(Deserialize)]
struct Project {
    model: ApiModel,
    type_system: TypeSystem,
}

fn main() {
    env_logger::builder().init();

    let matches = App::new("sbkgen")
        .about("Generates CPython extension-module C++ from a parsed C++ API model")
        .arg(
            Arg::with_name("project-file")
                .required(true)
                .help("Serialized API model and type system (JSON)"),
        )
        .arg(
            Arg::with_name("output-directory")
                .long("output-directory")
                .takes_value(true)
                .default_value(".")
                .help("Root directory the generated files are written under"),
        )
        .arg(
            Arg::with_name("license-file")
                .long("license-file")
                .takes_value(true)
                .help("File whose contents are prepended to every generated file"),
        )
        .arg(
            Arg::with_name("avoid-protected-hack")
                .long("avoid-protected-hack")
                .help("Reach protected members through wrapper thunks instead of '#define protected public'"),
        )
        .arg(
            Arg::with_name("enable-parent-ctor-heuristic")
                .long("enable-parent-ctor-heuristic")
                .help("Parent constructed objects to a constructor argument named 'parent'"),
        )
        .arg(
            Arg::with_name("enable-return-value-heuristic")
                .long("enable-return-value-heuristic")
                .help("Parent returned wrapper pointers to the receiving object"),
        )
        .arg(
            Arg::with_name("enable-pyside-extensions")
                .long("enable-pyside-extensions")
                .help("Emit the QObject/meta-object integration points"),
        )
        .arg(
            Arg::with_name("disable-verbose-error-messages")
                .long("disable-verbose-error-messages")
                .help("Emit compact TypeError messages without the overload listing"),
        )
        .arg(
            Arg::with_name("use-isnull-as-nb_nonzero")
                .long("use-isnull-as-nb_nonzero")
                .help("Use an isNull() const method as the Python boolean protocol"),
        )
        .get_matches();

    let project_path = matches.value_of("project-file").expect("required arg");
    let output_dir = matches.value_of("output-directory").expect("has default");

    let license_text = match matches.value_of("license-file") {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                eprintln!("sbkgen: cannot read license file '{}': {}", path, e);
                process::exit(1);
            }
        },
        None => None,
    };

    let config = GeneratorConfig {
        avoid_protected_hack: matches.is_present("avoid-protected-hack"),
        enable_parent_ctor_heuristic: matches.is_present("enable-parent-ctor-heuristic"),
        enable_return_value_heuristic: matches.is_present("enable-return-value-heuristic"),
        enable_pyside_extensions: matches.is_present("enable-pyside-extensions"),
        disable_verbose_error_messages: matches.is_present("disable-verbose-error-messages"),
        use_isnull_as_nb_nonzero: matches.is_present("use-isnull-as-nb_nonzero"),
        license_text,
        warning_allow_list: Vec::new(),
    };

    let project_text = match fs::read_to_string(project_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("sbkgen: cannot read project file '{}': {}", project_path, e);
            process::exit(1);
        }
    };
    let project: Project = match serde_json::from_str(&project_text) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("sbkgen: malformed project file '{}': {}", project_path, e);
            process::exit(1);
        }
    };

    let bindings = match generate(&project.model, &project.type_system, &config) {
        Ok(bindings) => bindings,
        Err(e) => {
            eprintln!("sbkgen: {}", e);
            process::exit(1);
        }
    };

    match write_to_directory(&bindings, Path::new(output_dir)) {
        Ok(written) => {
            log::info!(
                "{} files generated, {} written",
                bindings.files.len(),
                written
            );
        }
        Err(e) => {
            eprintln!("sbkgen: {}", e);
            process::exit(1);
        }
    }

    println!("{}", bindings.summary);
}

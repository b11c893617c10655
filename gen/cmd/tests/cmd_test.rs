// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use assert_cmd::Command;
use std::fs;

const EMPTY_PROJECT: &str = r#"{
    "model": {
        "classes": [],
        "functions": [],
        "enums": [],
        "global_functions": [],
        "global_enums": []
    },
    "type_system": {
        "entries": [],
        "package": "minimal",
        "module_name": "minimal",
        "required_imports": [],
        "code_snips": [],
        "extra_includes": []
    }
}"#;

#[test]
fn generates_module_files_for_an_empty_project() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project.json");
    fs::write(&project, EMPTY_PROJECT).unwrap();

    let assert = Command::cargo_bin("sbkgen")
        .unwrap()
        .arg(&project)
        .arg("--output-directory")
        .arg(dir.path())
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("warnings"), "summary line missing: {}", stdout);

    let header = dir.path().join("minimal/minimal_python.h");
    let unit = dir.path().join("minimal/minimal_module_wrapper.cpp");
    assert!(header.exists(), "module header missing");
    assert!(unit.exists(), "module translation unit missing");
    let unit_text = fs::read_to_string(unit).unwrap();
    assert!(unit_text.contains("SBK_MODULE_INIT_FUNCTION_BEGIN(minimal)"));
}

#[test]
fn missing_project_file_fails() {
    Command::cargo_bin("sbkgen")
        .unwrap()
        .arg("no-such-file.json")
        .assert()
        .failure();
}

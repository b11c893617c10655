// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! End-to-end checks over whole generated modules: the observable
//! properties are asserted on the emitted C++ text, never by running it.

use sbkgen_engine::{generate, write_to_directory, GeneratedBindings, GeneratorConfig};
use sbkgen_model::{
    AbstractType, ApiModel, Argument, ClassEntity, ClassId, ComplexData, Copyable, FunctionEntity,
    FunctionFlags, FunctionId, OperatorInfo, OperatorKind, TypeEntry, TypeEntryId, TypeEntryKind,
    TypeSystem, WrapperGeneration,
};

struct Builder {
    model: ApiModel,
    ts: TypeSystem,
    int_entry: TypeEntryId,
    double_entry: TypeEntryId,
    bool_entry: TypeEntryId,
}

impl Builder {
    fn new() -> Self {
        let mut ts = TypeSystem::new("sample", "sample");
        let int_entry = ts.add_entry(primitive("int"));
        let double_entry = ts.add_entry(primitive("double"));
        let bool_entry = ts.add_entry(primitive("bool"));
        Builder {
            model: ApiModel::new(),
            ts,
            int_entry,
            double_entry,
            bool_entry,
        }
    }

    fn class(&mut self, name: &str, is_object: bool) -> ClassId {
        let entry = self.ts.add_entry(TypeEntry {
            qualified_cpp_name: name.to_string(),
            target_lang_name: name.to_string(),
            package: "sample".to_string(),
            generation: WrapperGeneration::TargetLang,
            include: None,
            extra_includes: Vec::new(),
            custom_conversion: None,
            kind: TypeEntryKind::Complex(ComplexData {
                is_object_type: is_object,
                copyable: Copyable::Unknown,
                ..ComplexData::default()
            }),
        });
        self.model.add_class(ClassEntity {
            entry,
            name: name.to_string(),
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

    fn constructor(&mut self, class: ClassId, args: Vec<(&str, AbstractType, Option<&str>)>) -> FunctionId {
        let class_name = self.model.class(class).name.clone();
        let signature = format!(
            "{}({})",
            class_name,
            args.iter()
                .map(|(_, t, _)| t.cpp_signature(&self.ts))
                .collect::<Vec<_>>()
                .join(",")
        );
        let arguments = args
            .into_iter()
            .map(|(n, ty, default)| Argument {
                name: n.to_string(),
                ty,
                default_value: None,
                original_default_value: default.map(str::to_string),
            })
            .collect();
        let id = self.model.add_function(FunctionEntity {
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
        });
        self.model.class_mut(class).functions.push(id);
        id
    }

    fn operator(
        &mut self,
        class: ClassId,
        symbol: &str,
        args: Vec<(&str, AbstractType)>,
        ret: Option<AbstractType>,
        is_reverse: bool,
    ) -> FunctionId {
        let arguments = args
            .into_iter()
            .map(|(n, ty)| Argument {
                name: n.to_string(),
                ty,
                default_value: None,
                original_default_value: None,
            })
            .collect();
        let id = self.model.add_function(FunctionEntity {
            name: format!("operator{}", symbol),
            minimal_signature: format!("operator{}(...)", symbol),
            owner_class: Some(class),
            implementing_class: Some(class),
            declaring_class: Some(class),
            arguments,
            return_type: ret,
            flags: FunctionFlags {
                is_constant: true,
                ..Default::default()
            },
            operator: Some(OperatorInfo {
                symbol: symbol.to_string(),
                kind: OperatorKind::Binary,
                is_reverse,
            }),
            modifications: Default::default(),
        });
        self.model.class_mut(class).functions.push(id);
        id
    }

    fn generate(&self) -> GeneratedBindings {
        self.generate_with(GeneratorConfig::default())
    }

    fn generate_with(&self, config: GeneratorConfig) -> GeneratedBindings {
        generate(&self.model, &self.ts, &config).expect("generation succeeds")
    }
}

fn primitive(name: &str) -> TypeEntry {
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

fn file_content<'a>(bindings: &'a GeneratedBindings, suffix: &str) -> &'a str {
    bindings
        .files
        .iter()
        .find(|f| f.relative_path.to_string_lossy().ends_with(suffix))
        .unwrap_or_else(|| panic!("no file ending in {}", suffix))
        .content
        .as_str()
}

#[test]
fn numeric_overloads_keep_the_precise_test_first() {
    let mut b = Builder::new();
    let class = b.class("C", false);
    b.constructor(class, vec![("v", AbstractType::plain(b.int_entry), None)]);
    b.constructor(class, vec![("v", AbstractType::plain(b.double_entry), None)]);
    let bindings = b.generate();
    let unit = file_content(&bindings, "c_wrapper.cpp");
    // The exact PyFloat test must come before the generic int test so
    // C(3) picks int and C(3.0) picks double.
    let float_pos = unit.find("PyFloat_Check(").expect("float check emitted");
    let int_pos = unit
        .find("PrimitiveTypeConverter<int>()")
        .expect("int check emitted");
    assert!(float_pos < int_pos);
    assert!(unit.contains("// 0: C(int)"));
    assert!(unit.contains("// 1: C(double)"));
}

#[test]
fn generator_output_is_byte_identical_across_runs() {
    let build = || {
        let mut b = Builder::new();
        let class = b.class("Point", false);
        b.constructor(class, vec![]);
        b.constructor(
            class,
            vec![
                ("x", AbstractType::plain(b.int_entry), None),
                ("y", AbstractType::plain(b.int_entry), None),
            ],
        );
        b.generate()
    };
    let first = build();
    let second = build();
    assert_eq!(first.files.len(), second.files.len());
    for (a, b) in first.files.iter().zip(&second.files) {
        assert_eq!(a.relative_path, b.relative_path);
        assert_eq!(a.content, b.content, "{:?} differs", a.relative_path);
    }
}

#[test]
fn second_write_touches_no_files() {
    let mut b = Builder::new();
    let class = b.class("Point", false);
    b.constructor(class, vec![]);
    let bindings = b.generate();
    let dir = tempfile::tempdir().unwrap();
    let first = write_to_directory(&bindings, dir.path()).unwrap();
    assert_eq!(first, bindings.files.len());
    let second = write_to_directory(&bindings, dir.path()).unwrap();
    assert_eq!(second, 0, "second run must rewrite nothing");
}

#[test]
fn gil_brackets_are_balanced_in_every_file() {
    let mut b = Builder::new();
    let class = b.class("Worker", true);
    b.constructor(class, vec![]);
    let ret = AbstractType::plain(b.int_entry);
    let arg = AbstractType::plain(b.int_entry);
    let id = b.model.add_function(FunctionEntity {
        name: "process".into(),
        minimal_signature: "process(int)".into(),
        owner_class: Some(class),
        implementing_class: Some(class),
        declaring_class: Some(class),
        arguments: vec![Argument {
            name: "v".into(),
            ty: arg,
            default_value: None,
            original_default_value: None,
        }],
        return_type: Some(ret),
        flags: FunctionFlags {
            is_virtual: true,
            ..Default::default()
        },
        operator: None,
        modifications: Default::default(),
    });
    b.model.class_mut(class).functions.push(id);
    let bindings = b.generate();
    for file in &bindings.files {
        let saves = file.content.matches("PyEval_SaveThread()").count();
        let restores = file.content.matches("PyEval_RestoreThread(_save)").count();
        assert_eq!(
            saves, restores,
            "unbalanced allow-threads in {:?}",
            file.relative_path
        );
    }
}

#[test]
fn reverse_operator_synthesises_rmul() {
    let mut b = Builder::new();
    let class = b.class("V", false);
    b.constructor(class, vec![]);
    let v_ty = AbstractType::plain(b.model.class(class).entry);
    b.operator(
        class,
        "*",
        vec![("factor", AbstractType::plain(b.double_entry))],
        Some(v_ty),
        true,
    );
    let bindings = b.generate();
    let unit = file_content(&bindings, "v_wrapper.cpp");
    assert!(unit.contains("Sbk_VFunc___rmul__"));
    assert!(unit.contains("[reverse operator]"));
    // Reversed roles: the argument goes on the left of the call.
    assert!(unit.contains("cppArg0 * (*cppSelf)"));
    assert!(unit.contains("std::swap(self, pyArg);"));
}

#[test]
fn parent_heuristic_emits_exactly_one_set_parent() {
    let mut b = Builder::new();
    let parent = b.class("Parent", true);
    b.constructor(parent, vec![]);
    let child = b.class("Child", true);
    let parent_ty = AbstractType::pointer(b.model.class(parent).entry);
    b.constructor(child, vec![("parent", parent_ty, Some("0"))]);
    let config = GeneratorConfig {
        enable_parent_ctor_heuristic: true,
        ..Default::default()
    };
    let bindings = b.generate_with(config);
    let unit = file_content(&bindings, "child_wrapper.cpp");
    assert_eq!(unit.matches("Shiboken::Object::setParent(").count(), 1);

    // Without the heuristic no parenting call is emitted.
    let bindings = b.generate();
    let unit = file_content(&bindings, "child_wrapper.cpp");
    assert_eq!(unit.matches("Shiboken::Object::setParent(").count(), 0);
}

#[test]
fn derived_overload_is_tested_before_base() {
    let mut b = Builder::new();
    let base = b.class("Base", true);
    b.constructor(base, vec![]);
    let derived = b.class("Derived", true);
    b.model.class_mut(derived).base_classes.push(base);
    b.constructor(derived, vec![]);
    let owner = b.class("Owner", false);
    b.constructor(owner, vec![]);
    let base_ty = AbstractType::pointer(b.model.class(base).entry);
    let derived_ty = AbstractType::pointer(b.model.class(derived).entry);
    let f1 = b.model.add_function(FunctionEntity {
        name: "accept".into(),
        minimal_signature: "accept(Base*)".into(),
        owner_class: Some(owner),
        implementing_class: Some(owner),
        declaring_class: Some(owner),
        arguments: vec![Argument {
            name: "o".into(),
            ty: base_ty,
            default_value: None,
            original_default_value: None,
        }],
        return_type: None,
        flags: FunctionFlags::default(),
        operator: None,
        modifications: Default::default(),
    });
    let f2 = b.model.add_function(FunctionEntity {
        name: "accept".into(),
        minimal_signature: "accept(Derived*)".into(),
        owner_class: Some(owner),
        implementing_class: Some(owner),
        declaring_class: Some(owner),
        arguments: vec![Argument {
            name: "o".into(),
            ty: derived_ty,
            default_value: None,
            original_default_value: None,
        }],
        return_type: None,
        flags: FunctionFlags::default(),
        operator: None,
        modifications: Default::default(),
    });
    b.model.class_mut(owner).functions.push(f1);
    b.model.class_mut(owner).functions.push(f2);
    let bindings = b.generate();
    let unit = file_content(&bindings, "owner_wrapper.cpp");
    let derived_pos = unit.find("SBK_DERIVED_IDX").expect("derived check");
    let base_pos = unit.find("SBK_BASE_IDX").expect("base check");
    assert!(
        derived_pos < base_pos,
        "derived overload must be tested before the base one"
    );
}

#[test]
fn module_header_indices_are_stable_and_complete() {
    let mut b = Builder::new();
    let point = b.class("Point", false);
    b.constructor(point, vec![]);
    let widget = b.class("Widget", true);
    b.constructor(widget, vec![]);
    let bindings = b.generate();
    let header = file_content(&bindings, "sample_python.h");
    assert!(header.contains("#define SBK_POINT_IDX"));
    assert!(header.contains("#define SBK_WIDGET_IDX"));
    assert!(header.contains("SBK_sample_IDX_COUNT"));
    assert!(header.contains("SBK_sample_CONVERTERS_IDX_COUNT"));

    let module_unit = file_content(&bindings, "sample_module_wrapper.cpp");
    // Every class init is called before the module is published.
    let register_pos = module_unit.find("Shiboken::Module::registerTypes").unwrap();
    for init in ["init_Point(module);", "init_Widget(module);"] {
        let pos = module_unit.find(init).unwrap();
        assert!(pos < register_pos);
    }
}

#[test]
fn license_text_is_prepended_to_every_file() {
    let mut b = Builder::new();
    let point = b.class("Point", false);
    b.constructor(point, vec![]);
    let config = GeneratorConfig {
        license_text: Some("// Copyright notice\n".to_string()),
        ..Default::default()
    };
    let bindings = b.generate_with(config);
    for file in &bindings.files {
        assert!(
            file.content.starts_with("// Copyright notice"),
            "{:?} lacks the license header",
            file.relative_path
        );
    }
}

#[test]
fn value_type_registers_copy_converters_before_use() {
    let mut b = Builder::new();
    let point = b.class("Point", false);
    b.constructor(point, vec![]);
    let bindings = b.generate();
    let unit = file_content(&bindings, "point_wrapper.cpp");
    // The converter functions precede the registration that uses them.
    let conv_def = unit
        .find("static void Point_PythonToCpp_Point_COPY")
        .expect("copy converter");
    let register = unit
        .find("Shiboken::Conversions::createConverter")
        .expect("registration");
    assert!(conv_def < register);
    // And registration happens inside the class init routine.
    let init = unit.find("void init_Point(PyObject* module)").unwrap();
    assert!(register > init);
}

// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Collapses a group of C++ overloads sharing one Python name into an
//! argument-position trie whose siblings are sorted so that more
//! specific type tests run before more general ones. The dispatcher
//! emitted for the group walks this trie.

use indexmap::IndexMap;
use itertools::Itertools;

use sbkgen_model::{AbstractType, FunctionId};

use super::classify::{NON_INTEGER_PRIMITIVES, ORDERED_PRIMITIVES, SIGNED_INTEGER_PRIMITIVES};
use super::graph::Graph;
use super::EmitCtx;

/// One node of the trie: a candidate argument type at one position.
#[derive(Debug)]
pub struct OverloadNode {
    /// -1 at the root, which represents the function entry point.
    pub arg_pos: i32,
    pub arg_type: Option<AbstractType>,
    /// Type replacement from the type system; treated as a distinct
    /// type matched only by textual equality.
    pub arg_type_replaced: Option<String>,
    /// Functions still viable at this node, in insertion order.
    pub overloads: Vec<FunctionId>,
    pub children: Vec<OverloadNode>,
}

impl OverloadNode {
    fn new_root() -> Self {
        OverloadNode {
            arg_pos: -1,
            arg_type: None,
            arg_type_replaced: None,
            overloads: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Whether no deeper node still carries `func`: its signature ends
    /// at this position.
    pub fn is_final_occurrence(&self, func: FunctionId) -> bool {
        !self
            .children
            .iter()
            .any(|child| child.overloads.contains(&func))
    }

    /// The first overload whose argument at this position carries a
    /// default value.
    pub fn function_with_default_value(&self, ctx: &EmitCtx) -> Option<FunctionId> {
        if self.arg_pos < 0 {
            return None;
        }
        self.overloads.iter().copied().find(|&fid| {
            argument_at(ctx, fid, self.arg_pos as usize)
                .map_or(false, |arg| arg.has_default_value())
        })
    }

    pub fn next_argument_has_default_value(&self, ctx: &EmitCtx) -> bool {
        self.children
            .iter()
            .any(|c| c.function_with_default_value(ctx).is_some())
    }

    /// The shallowest node in this subtree whose argument has a default.
    pub fn find_next_arg_with_default(&self, ctx: &EmitCtx) -> Option<i32> {
        let mut best: Option<i32> = None;
        if self.function_with_default_value(ctx).is_some() {
            best = Some(self.arg_pos);
        }
        for child in &self.children {
            if let Some(pos) = child.find_next_arg_with_default(ctx) {
                if best.map_or(true, |b| b > pos) {
                    best = Some(pos);
                }
            }
        }
        best
    }
}

/// The Python argument (by visible position) a function sees at a trie
/// node, skipping removed arguments.
pub fn argument_at<'m>(
    ctx: &EmitCtx<'m>,
    func: FunctionId,
    visible_pos: usize,
) -> Option<&'m sbkgen_model::Argument> {
    let f = ctx.model.function(func);
    f.visible_arguments().nth(visible_pos).map(|(_, arg)| arg)
}

/// The trie for one overload group, rooted at the entry point.
pub struct OverloadData {
    pub root: OverloadNode,
    pub min_args: usize,
    pub max_args: usize,
    overloads: Vec<FunctionId>,
}

impl OverloadData {
    pub fn new(ctx: &EmitCtx, overloads: &[FunctionId]) -> Self {
        let mut root = OverloadNode::new_root();
        root.overloads = overloads.to_vec();
        for &fid in overloads {
            let func = ctx.model.function(fid);
            let mut current = &mut root;
            for (orig_idx, arg) in func.visible_arguments() {
                let child_idx = find_or_create_child(ctx, current, fid, orig_idx, arg);
                current = &mut current.children[child_idx];
                current.overloads.push(fid);
            }
        }
        dedup_node_overloads(&mut root);

        let (min_args, max_args) = min_max_arguments(ctx, overloads);
        let mut data = OverloadData {
            root,
            min_args,
            max_args,
            overloads: overloads.to_vec(),
        };
        sort_node(ctx, &mut data.root);
        if data.min_args > data.max_args {
            data.min_args = data.max_args;
        }
        data
    }

    pub fn overloads(&self) -> &[FunctionId] {
        &self.overloads
    }

    pub fn reference_function(&self) -> FunctionId {
        self.overloads[0]
    }

    /// The dispatchable overloads: a const overload shadowed by a
    /// non-const twin with the same signature is dropped.
    pub fn overloads_without_repetition(&self, ctx: &EmitCtx) -> Vec<FunctionId> {
        let mut result = self.overloads.clone();
        for &fid in &self.overloads {
            let sig = &ctx.model.function(fid).minimal_signature;
            if sig.ends_with("const") {
                continue;
            }
            let shadowed = format!("{}const", sig);
            result.retain(|&other| {
                other == fid || ctx.model.function(other).minimal_signature != shadowed
            });
        }
        result
    }

    /// The stable overload id used in the emitted `switch`.
    pub fn function_number(&self, func: FunctionId) -> usize {
        self.overloads
            .iter()
            .position(|&f| f == func)
            .expect("function not part of this overload group")
    }

    pub fn has_argument_with_default_value(&self, ctx: &EmitCtx) -> bool {
        if self.max_args == 0 {
            return false;
        }
        self.overloads.iter().any(|&fid| {
            ctx.model
                .function(fid)
                .visible_arguments()
                .any(|(_, a)| a.has_default_value())
        })
    }

    pub fn has_static_function(&self, ctx: &EmitCtx) -> bool {
        self.overloads
            .iter()
            .any(|&f| ctx.model.function(f).flags.is_static)
    }

    pub fn has_instance_function(&self, ctx: &EmitCtx) -> bool {
        self.overloads
            .iter()
            .any(|&f| !ctx.model.function(f).flags.is_static)
    }

    pub fn has_allow_thread(&self, ctx: &EmitCtx) -> bool {
        self.overloads
            .iter()
            .any(|&f| ctx.model.function(f).flags.allow_thread)
    }

    pub fn has_non_void_return_type(&self, ctx: &EmitCtx) -> bool {
        self.overloads.iter().any(|&f| {
            let func = ctx.model.function(f);
            func.type_replaced(0).is_some()
                || (func.return_type.is_some() && !func.argument_removed(0))
        })
    }

    /// Single-argument form: every overload takes exactly one visible
    /// argument; dispatch can read `args` directly as that argument.
    pub fn is_single_argument(&self, ctx: &EmitCtx) -> bool {
        self.overloads
            .iter()
            .all(|&f| ctx.model.function(f).visible_argument_count() == 1)
    }

    /// Whether the wrapper takes a packed argument array rather than a
    /// single PyObject.
    pub fn uses_py_args(&self, ctx: &EmitCtx) -> bool {
        let reference = ctx.model.function(self.reference_function());
        if reference.is_call_operator() {
            return true;
        }
        if reference.is_operator_overload() {
            return false;
        }
        self.min_args != self.max_args
            || self.max_args > 1
            || reference.flags.is_constructor
            || self.has_argument_with_default_value(ctx)
    }

    /// Argument counts between min and max that no overload accepts,
    /// even with defaults applied; the wrapper rejects them up front.
    pub fn invalid_argument_lengths(&self, ctx: &EmitCtx) -> Vec<usize> {
        let mut valid = indexmap::IndexSet::new();
        for &fid in &self.overloads {
            let func = ctx.model.function(fid);
            for (visible_pos, (_, arg)) in func.visible_arguments().enumerate() {
                if arg.has_default_value() {
                    valid.insert(visible_pos);
                }
            }
            valid.insert(func.visible_argument_count());
        }
        ((self.min_args + 1)..self.max_args)
            .filter(|n| !valid.contains(n))
            .collect()
    }
}

fn dedup_node_overloads(node: &mut OverloadNode) {
    let mut seen = indexmap::IndexSet::new();
    node.overloads.retain(|f| seen.insert(*f));
    for child in &mut node.children {
        dedup_node_overloads(child);
    }
}

fn find_or_create_child(
    ctx: &EmitCtx,
    parent: &mut OverloadNode,
    func: FunctionId,
    orig_arg_idx: usize,
    arg: &sbkgen_model::Argument,
) -> usize {
    let f = ctx.model.function(func);
    let replaced = f.type_replaced(orig_arg_idx + 1).map(str::to_string);
    if !f.is_operator_overload() {
        for (i, child) in parent.children.iter().enumerate() {
            let child_replaced = child.arg_type_replaced.as_deref();
            let either_replaced = replaced.is_some() || child_replaced.is_some();
            let matches = if either_replaced {
                replaced.as_deref() == child_replaced && replaced.is_some()
            } else {
                child
                    .arg_type
                    .as_ref()
                    .map_or(false, |ty| types_are_equal(ctx, ty, &arg.ty))
            };
            if matches {
                return i;
            }
        }
    }
    parent.children.push(OverloadNode {
        arg_pos: parent.arg_pos + 1,
        arg_type: Some(arg.ty.clone()),
        arg_type_replaced: replaced,
        overloads: Vec::new(),
        children: Vec::new(),
    });
    parent.children.len() - 1
}

/// Type equivalence for trie merging: same entry, same container
/// instantiations recursively, same CString-ness.
fn types_are_equal(ctx: &EmitCtx, a: &AbstractType, b: &AbstractType) -> bool {
    if a.entry != b.entry {
        return false;
    }
    if ctx.ts.entry(a.entry).is_container() {
        return a.instantiations.len() == b.instantiations.len()
            && a.instantiations
                .iter()
                .zip(&b.instantiations)
                .all(|(x, y)| types_are_equal(ctx, x, y));
    }
    ctx.is_cstring(a) == ctx.is_cstring(b)
}

fn min_max_arguments(ctx: &EmitCtx, overloads: &[FunctionId]) -> (usize, usize) {
    let mut min_args = usize::MAX;
    let mut max_args = 0;
    for &fid in overloads {
        let func = ctx.model.function(fid);
        let num_args = func.visible_argument_count();
        max_args = max_args.max(num_args);
        min_args = min_args.min(num_args);
        for (visible_pos, (_, arg)) in func.visible_arguments().enumerate() {
            if arg.has_default_value() && visible_pos < min_args {
                min_args = visible_pos;
            }
        }
    }
    if min_args == usize::MAX {
        min_args = 0;
    }
    (min_args, max_args)
}

/// The name under which a candidate type participates in the sort
/// graph. Primitive aliases resolve first; containers append their
/// instantiations so distinct instantiations stay distinct.
fn sort_type_name(ctx: &EmitCtx, ty: &AbstractType) -> String {
    let entry = ctx.ts.entry(ctx.ts.basic_aliased_entry(ty.entry));
    let mut name = entry.name().to_string();
    if entry.is_container() && !ty.instantiations.is_empty() {
        let inner = ty
            .instantiations
            .iter()
            .map(|i| sort_type_name(ctx, i))
            .join(", ");
        name = format!("{}<{} >", name, inner);
    }
    name
}

fn node_sort_name(ctx: &EmitCtx, node: &OverloadNode) -> String {
    if let Some(replaced) = &node.arg_type_replaced {
        return replaced.clone();
    }
    node.arg_type
        .as_ref()
        .map(|ty| sort_type_name(ctx, ty))
        .unwrap_or_default()
}

/// The sort-graph name of a container with one instantiation replaced
/// by an implicit-conversion source.
fn implicit_conversion_container_name(
    ctx: &EmitCtx,
    container: &AbstractType,
    instantiation: &AbstractType,
    source_name: &str,
) -> String {
    let inner = container
        .instantiations
        .iter()
        .map(|other| {
            if std::ptr::eq(other, instantiation) {
                source_name.to_string()
            } else {
                sort_type_name(ctx, other)
            }
        })
        .join(", ");
    format!(
        "{}<{} >",
        ctx.ts.entry(ctx.ts.basic_aliased_entry(container.entry)).name(),
        inner
    )
}

/// The name of the C++ type an implicit conversion converts from.
fn implicit_source_name(ctx: &EmitCtx, conversion: FunctionId) -> String {
    let func = ctx.model.function(conversion);
    if func.is_conversion_operator() {
        let owner = func.owner_class.expect("conversion operator without owner");
        ctx.ts
            .entry(ctx.model.class(owner).entry)
            .name()
            .to_string()
    } else {
        sort_type_name(ctx, &func.arguments[0].ty)
    }
}

struct SortState {
    counter: usize,
    /// type name -> graph node id, insertion-ordered. A repeated child
    /// name (operator branches never merge) points at the latest id.
    map: IndexMap<String, usize>,
    /// graph node id -> child index, for ids that are real children.
    child_of: IndexMap<usize, usize>,
}

impl SortState {
    fn new() -> Self {
        SortState {
            counter: 0,
            map: IndexMap::new(),
            child_of: IndexMap::new(),
        }
    }

    fn map_type(&mut self, name: String) -> usize {
        if let Some(&id) = self.map.get(&name) {
            return id;
        }
        let id = self.counter;
        self.counter += 1;
        self.map.insert(name, id);
        id
    }

    fn map_child(&mut self, name: String, child_idx: usize) -> usize {
        let id = self.counter;
        self.counter += 1;
        self.map.insert(name, id);
        self.child_of.insert(id, child_idx);
        id
    }
}

/// Topologically sort the children of `node` by implicit-conversion
/// priority, so an explicit overload for a convertible type is tested
/// before the type it converts into.
fn sort_node(ctx: &EmitCtx, node: &mut OverloadNode) {
    for child in &mut node.children {
        sort_node(ctx, child);
    }
    if node.children.len() <= 1 {
        return;
    }

    let mut state = SortState::new();
    let mut py_object_id = None;
    let mut py_sequence_id = None;
    let mut py_buffer_id = None;
    let mut qvariant_id = None;
    let mut qstring_id = None;

    for (idx, child) in node.children.iter().enumerate() {
        let name = node_sort_name(ctx, child);
        let id = state.map_child(name.clone(), idx);

        if py_object_id.is_none() && name.contains("PyObject") {
            py_object_id = Some(id);
        } else if py_sequence_id.is_none() && name == "PySequence" {
            py_sequence_id = Some(id);
        } else if py_buffer_id.is_none() && name == "PyBuffer" {
            py_buffer_id = Some(id);
        } else if qvariant_id.is_none() && name == "QVariant" {
            qvariant_id = Some(id);
        } else if qstring_id.is_none() && name == "QString" {
            qstring_id = Some(id);
        }

        // Dependencies contributed by container instantiations: the
        // instantiation types themselves, and instantiations replaced
        // by their implicit-conversion sources (list<int> must be
        // tested before list<double> when int converts to double).
        if let Some(arg_type) = &child.arg_type {
            for inst in &arg_type.instantiations {
                state.map_type(sort_type_name(ctx, inst));
                let inst_entry = ctx.ts.entry(ctx.ts.basic_aliased_entry(inst.entry));
                if inst_entry.is_primitive()
                    && SIGNED_INTEGER_PRIMITIVES.contains(&inst_entry.name())
                {
                    for primitive in NON_INTEGER_PRIMITIVES {
                        state.map_type(implicit_conversion_container_name(
                            ctx, arg_type, inst, primitive,
                        ));
                    }
                } else {
                    for conv in ctx.model.implicit_conversions(inst.entry) {
                        let source = implicit_source_name(ctx, conv);
                        state.map_type(implicit_conversion_container_name(
                            ctx, arg_type, inst, &source,
                        ));
                    }
                }
            }
        }
    }

    let mut graph = Graph::new(state.counter);
    let primitive_ids: Vec<Option<usize>> = ORDERED_PRIMITIVES
        .iter()
        .map(|p| state.map.get(*p).copied())
        .collect();

    if let (Some(seq), Some(obj)) = (py_sequence_id, py_object_id) {
        graph.add_edge(seq, obj);
    }

    let mut classes_with_integer_implicit_conversion = Vec::new();

    for child in node.children.iter() {
        let target_name = node_sort_name(ctx, child);
        let target_id = state.map[&target_name];
        let Some(target_type) = child.arg_type.as_ref() else {
            continue;
        };
        let target_entry = ctx.ts.entry(target_type.entry);

        for conv in ctx.model.implicit_conversions(target_type.entry) {
            let convertible = implicit_source_name(ctx, conv);
            if convertible == "int" || convertible == "unsigned int" {
                classes_with_integer_implicit_conversion.push(target_name.clone());
            }
            if let Some(&convertible_id) = state.map.get(&convertible) {
                // A reverse pair may already exist from the container
                // check; the conversion edge wins.
                graph.remove_edge(target_id, convertible_id);
                graph.add_edge(convertible_id, target_id);
            }
        }

        if target_entry.is_complex() {
            if let Some(class_id) = ctx.model.find_class_by_entry(target_type.entry) {
                for ancestor in ctx.model.all_ancestors(class_id) {
                    let ancestor_name =
                        ctx.ts.entry(ctx.model.class(ancestor).entry).name().to_string();
                    if let Some(&ancestor_id) = state.map.get(&ancestor_name) {
                        graph.remove_edge(ancestor_id, target_id);
                        graph.add_edge(target_id, ancestor_id);
                    }
                }
            }
        }

        for inst in &target_type.instantiations {
            if let Some(&inst_id) = state.map.get(&sort_type_name(ctx, inst)) {
                if !graph.contains_edge(target_id, inst_id) {
                    graph.add_edge(inst_id, target_id);
                }
                let inst_entry = ctx.ts.entry(ctx.ts.basic_aliased_entry(inst.entry));
                let conv_names: Vec<String> = if inst_entry.is_primitive()
                    && SIGNED_INTEGER_PRIMITIVES.contains(&inst_entry.name())
                {
                    NON_INTEGER_PRIMITIVES
                        .iter()
                        .map(|p| implicit_conversion_container_name(ctx, target_type, inst, p))
                        .collect()
                } else {
                    ctx.model
                        .implicit_conversions(inst.entry)
                        .into_iter()
                        .map(|conv| {
                            let source = implicit_source_name(ctx, conv);
                            implicit_conversion_container_name(ctx, target_type, inst, &source)
                        })
                        .collect()
                };
                for conv_name in conv_names {
                    if let Some(&conv_id) = state.map.get(&conv_name) {
                        if !graph.contains_edge(target_id, conv_id) {
                            graph.add_edge(conv_id, target_id);
                        }
                    }
                }
            }
        }

        let is_special = target_name.contains("PyObject")
            || target_name.contains("PyBuffer")
            || target_name.contains("PySequence");
        if (py_sequence_id.is_some() || py_object_id.is_some() || py_buffer_id.is_some())
            && !is_special
        {
            if let Some(seq) = py_sequence_id {
                // PySequence is checked after all more specific types,
                // but before PyObject.
                graph.add_edge(target_id, seq);
            } else if let Some(buf) = py_buffer_id {
                graph.add_edge(target_id, buf);
            } else if let Some(obj) = py_object_id {
                graph.add_edge(target_id, obj);
            }
        } else if qvariant_id.is_some() && target_name != "QVariant" {
            let qv = qvariant_id.unwrap();
            if !graph.contains_edge(qv, target_id) {
                graph.add_edge(target_id, qv);
            }
        } else if qstring_id.is_some()
            && target_type.is_pointer()
            && target_name != "QString"
            && target_name != "QByteArray"
            && Some(target_id) != py_object_id
        {
            let qs = qstring_id.unwrap();
            if !graph.contains_edge(qs, target_id) {
                graph.add_edge(target_id, qs);
            }
        }

        if target_entry.is_enum() {
            for id in primitive_ids.iter().flatten() {
                graph.add_edge(target_id, *id);
            }
        }
    }

    // QByteArray args need to be checked after QString args.
    if let (Some(&qs), Some(&qba)) = (state.map.get("QString"), state.map.get("QByteArray")) {
        graph.add_edge(qs, qba);
    }

    // Enum values must precede types implicitly convertible from int.
    for child in node.children.iter() {
        let Some(ty) = child.arg_type.as_ref() else {
            continue;
        };
        if !ctx.ts.entry(ty.entry).is_enum() {
            continue;
        }
        let enum_id = state.map[&node_sort_name(ctx, child)];
        for class_name in &classes_with_integer_implicit_conversion {
            graph.add_edge(enum_id, state.map[class_name]);
        }
    }

    // double(int i) and friends are not represented in the model as
    // implicit conversions, so the non-integer primitives are ordered
    // before the signed integers explicitly.
    for signed in SIGNED_INTEGER_PRIMITIVES {
        if let Some(&signed_id) = state.map.get(*signed) {
            for non_integer in NON_INTEGER_PRIMITIVES {
                if let Some(&ni_id) = state.map.get(*non_integer) {
                    graph.add_edge(ni_id, signed_id);
                }
            }
        }
    }

    match graph.topological_sort() {
        Some(order) => {
            let mut taken: Vec<Option<OverloadNode>> =
                std::mem::take(&mut node.children).into_iter().map(Some).collect();
            for id in order {
                if let Some(&child_idx) = state.child_of.get(&id) {
                    if let Some(child) = taken[child_idx].take() {
                        node.children.push(child);
                    }
                }
            }
            // Anything unplaced keeps its insertion position.
            for leftover in taken.into_iter().flatten() {
                node.children.push(leftover);
            }
        }
        None => {
            let func = ctx.model.function(node.overloads[0]);
            let mut name = func.name.clone();
            if let Some(owner) = func.owner_class {
                name = format!("{}.{}", ctx.model.class(owner).name, name);
            }
            let mut names: Vec<String> =
                (0..state.counter).map(|i| format!("n{}", i)).collect();
            for (type_name, &id) in &state.map {
                names[id] = type_name.clone();
            }
            ctx.diags.warn(format!(
                "Cyclic dependency found on overload data for '{}' method",
                name
            ));
            ctx.diags.dump_graph(name, graph.dump_dot(&names));
            // Generation continues with the insertion order.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_fixtures::ModelBuilder;

    #[test]
    fn exact_double_check_runs_before_generic_int_check() {
        // The int predicate accepts any Python number, so the precise
        // float test must run first or C(3.0) would pick the int
        // overload.
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let f_int = b.constructor(class, &[("v", b.int_ty())]);
        let f_double = b.constructor(class, &[("v", b.double_ty())]);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);

        let data = OverloadData::new(&ctx, &[f_double, f_int]);
        let order: Vec<String> = data
            .root
            .children
            .iter()
            .map(|c| node_sort_name(&ctx, c))
            .collect();
        assert_eq!(order, vec!["double".to_string(), "int".to_string()]);
    }

    #[test]
    fn enum_is_checked_before_int() {
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let enum_ty = b.enum_type("C::Mode");
        let f_enum = b.method(class, "f", &[("m", enum_ty.clone())], None);
        let f_int = b.method(class, "f", &[("v", b.int_ty())], None);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);

        let data = OverloadData::new(&ctx, &[f_int, f_enum]);
        let order: Vec<String> = data
            .root
            .children
            .iter()
            .map(|c| node_sort_name(&ctx, c))
            .collect();
        assert_eq!(order[0], "Mode");
        assert_eq!(order[1], "int");
    }

    #[test]
    fn derived_class_is_checked_before_base() {
        let mut b = ModelBuilder::new();
        let base = b.object_class("Base");
        let derived = b.derived_class("Derived", base);
        let owner = b.value_class("C");
        let base_ty = b.pointer_to(base);
        let derived_ty = b.pointer_to(derived);
        let f_base = b.method(owner, "f", &[("o", base_ty)], None);
        let f_derived = b.method(owner, "f", &[("o", derived_ty)], None);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);

        let data = OverloadData::new(&ctx, &[f_base, f_derived]);
        let order: Vec<String> = data
            .root
            .children
            .iter()
            .map(|c| node_sort_name(&ctx, c))
            .collect();
        assert_eq!(order, vec!["Derived".to_string(), "Base".to_string()]);
    }

    #[test]
    fn implicitly_convertible_source_is_checked_first() {
        let mut b = ModelBuilder::new();
        let owner = b.value_class("Owner");
        let source = b.value_class("Source");
        let target = b.value_class("Target");
        // Target(Source) makes Source implicitly convertible to Target.
        let source_ty = b.value_ty(source);
        b.constructor(target, &[("s", source_ty.clone())]);
        let target_ty = b.value_ty(target);
        let f_source = b.method(owner, "f", &[("s", source_ty)], None);
        let f_target = b.method(owner, "f", &[("t", target_ty)], None);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);

        let data = OverloadData::new(&ctx, &[f_target, f_source]);
        let order: Vec<String> = data
            .root
            .children
            .iter()
            .map(|c| node_sort_name(&ctx, c))
            .collect();
        assert_eq!(order, vec!["Source".to_string(), "Target".to_string()]);
    }

    #[test]
    fn min_args_accounts_for_defaults_and_removals() {
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let int_ty = b.int_ty();
        let f = b.method_with_defaults(
            class,
            "f",
            &[("a", int_ty.clone(), None), ("b", int_ty, Some("0"))],
        );
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);

        let data = OverloadData::new(&ctx, &[f]);
        assert_eq!(data.min_args, 1);
        assert_eq!(data.max_args, 2);
    }

    #[test]
    fn trie_merges_equal_prefixes() {
        let mut b = ModelBuilder::new();
        let class = b.value_class("C");
        let int_ty = b.int_ty();
        let double_ty = b.double_ty();
        let f1 = b.method(
            class,
            "f",
            &[("a", double_ty.clone()), ("b", int_ty)],
            None,
        );
        let f2 = b.method(class, "f", &[("a", double_ty.clone()), ("b", double_ty)], None);
        let (model, ts, config, diags) = b.build();
        let ctx = EmitCtx::new(&model, &ts, &config, &diags);

        let data = OverloadData::new(&ctx, &[f1, f2]);
        // One shared "double" child at position 0, two children below.
        assert_eq!(data.root.children.len(), 1);
        assert_eq!(data.root.children[0].children.len(), 2);
        assert_eq!(data.root.children[0].overloads.len(), 2);
    }
}

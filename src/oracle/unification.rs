// SPDX-License-Identifier: BSD-3-Clause
//! Whole-module, flow-insensitive, unification-based object classification.
//!
//! Steensgaard's algorithm: every pointer-valued cell has a single pointee
//! cell, and copies unify pointees rather than adding subset constraints.
//! The classes of memory cells that remain at the end are the abstract
//! objects. One pass over the module is enough, since unification does not
//! depend on the order constraints are visited in.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;

use super::{Access, AliasOracle, ObjectId, ObjectInfo, ObjectKind, ObjectSet};
use crate::ir::{AllocKind, Callee, FuncId, GlobalId, InstId, Module, Opcode, Operand};
use crate::signatures::{AllocType, Signature, Signatures};
use crate::union::EqClass;

/// Memory cells sort before value cells, and the unspecific cell before
/// everything, so it leads any class it joins.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
enum Cell {
    Unspecific,
    Global(GlobalId),
    Alloc(FuncId, InstId),
    /// Memory created on demand as the pointee of some other cell
    Deref(u32),
    Value(FuncId, InstId),
    Param(FuncId, u32),
    Ret(FuncId),
}

impl Cell {
    fn is_memory(&self) -> bool {
        match self {
            Cell::Unspecific => true,
            Cell::Global(_) => true,
            Cell::Alloc(..) => true,
            Cell::Deref(_) => true,
            // No `_` pattern to ensure this is updated if the type changes
            Cell::Value(..) => false,
            Cell::Param(..) => false,
            Cell::Ret(_) => false,
        }
    }
}

#[derive(Default)]
struct Solver {
    classes: EqClass<Cell>,
    /// Class leader to (some member of) the pointee class
    pts: FxHashMap<Cell, Cell>,
    derefs: u32,
}

impl Solver {
    fn new() -> Self {
        let mut s = Solver::default();
        s.classes.insert(Cell::Unspecific);
        s.pts.insert(Cell::Unspecific, Cell::Unspecific);
        s
    }

    fn pts(&mut self, c: Cell) -> Cell {
        self.classes.insert(c);
        let r = self.classes.find(c);
        if let Some(p) = self.pts.get(&r) {
            return *p;
        }
        let d = Cell::Deref(self.derefs);
        self.derefs += 1;
        self.classes.insert(d);
        self.pts.insert(r, d);
        d
    }

    fn unify(&mut self, a: Cell, b: Cell) {
        let mut work = vec![(a, b)];
        while let Some((a, b)) = work.pop() {
            let (ra, rb) = (self.classes.find(a), self.classes.find(b));
            if ra == rb {
                continue;
            }
            let pa = self.pts.remove(&ra);
            let pb = self.pts.remove(&rb);
            let (leader, _) = self.classes.union(ra, rb);
            match (pa, pb) {
                (Some(x), Some(y)) => {
                    self.pts.insert(leader, x);
                    work.push((x, y));
                }
                (Some(x), None) | (None, Some(x)) => {
                    self.pts.insert(leader, x);
                }
                (None, None) => (),
            }
        }
    }

    /// The memory cell an operand points to, if it is a pointer at all.
    fn target(&mut self, func: FuncId, op: Operand) -> Option<Cell> {
        match op {
            Operand::Local(i) => Some(self.pts(Cell::Value(func, i))),
            Operand::Param(p) => Some(self.pts(Cell::Param(func, p))),
            Operand::Global(g) => {
                self.classes.insert(Cell::Global(g));
                Some(Cell::Global(g))
            }
            Operand::Function(_) => None,
            Operand::Decl(_) => None,
            Operand::Null => None,
            Operand::Undef => None,
        }
    }

    fn unify_targets(&mut self, func: FuncId, x: InstId, op: Operand) {
        let tx = self.pts(Cell::Value(func, x));
        if let Some(t) = self.target(func, op) {
            self.unify(tx, t);
        }
    }

    fn havoc(&mut self, c: Cell) {
        let p = self.pts(c);
        self.unify(p, Cell::Unspecific);
    }

    /// Existing pointee of a cell, without creating one.
    fn pointee(&self, c: Cell) -> Option<Cell> {
        self.pts.get(&self.classes.find(c)).copied()
    }
}

/// Per-call modeling of a callee that has no body in the module.
enum External<'a> {
    Signatures(&'a [Signature]),
    Opaque,
}

#[derive(Debug)]
pub struct UnificationOracle {
    infos: Vec<ObjectInfo>,
    unspecific: ObjectId,
    allocs: FxHashMap<(FuncId, InstId), ObjectId>,
    accesses: Vec<Vec<Access>>,
    params: Vec<Vec<ObjectSet>>,
    /// Indexed by [`FuncId`], then parameter
    param_targets: Vec<Vec<Option<ObjectId>>>,
    globals: ObjectSet,
    /// Indexed by [`GlobalId`]
    global_storage: Vec<ObjectId>,
    /// Indexed by [`ObjectId`]
    contents: Vec<Option<ObjectId>>,
    objects: Vec<ObjectSet>,
}

impl UnificationOracle {
    pub fn new(module: &Module, signatures: &Signatures) -> Self {
        let _span = tracing::debug_span!("unification_oracle").entered();
        let mut s = Solver::new();

        let decl_sigs: Vec<Option<Vec<Signature>>> = module
            .decls
            .iter()
            .map(|d| signatures.signatures_for(d.name.get()))
            .collect();

        for g in module.global_ids() {
            s.classes.insert(Cell::Global(g));
            match module.globals[g.index()].initializer {
                Some(Operand::Global(h)) => {
                    let content = s.pts(Cell::Global(g));
                    s.unify(content, Cell::Global(h));
                }
                Some(_) => (),
                None => (),
            }
        }

        for func in module.function_ids() {
            let f = module.function(func);
            for p in f.pointer_params() {
                s.pts(Cell::Param(func, p));
            }
            for i in f.inst_ids() {
                match &f.instruction(i).opcode {
                    Opcode::Alloc { .. } => {
                        s.classes.insert(Cell::Alloc(func, i));
                        let t = s.pts(Cell::Value(func, i));
                        s.unify(t, Cell::Alloc(func, i));
                    }
                    Opcode::Load { pointer } => {
                        let tx = s.pts(Cell::Value(func, i));
                        match s.target(func, *pointer) {
                            Some(t) => {
                                let content = s.pts(t);
                                s.unify(tx, content);
                            }
                            None => s.unify(tx, Cell::Unspecific),
                        }
                    }
                    Opcode::Store { pointer, value } => {
                        let tv = s.target(func, *value);
                        match (s.target(func, *pointer), tv) {
                            (Some(t), Some(tv)) => {
                                let content = s.pts(t);
                                s.unify(content, tv);
                            }
                            (Some(t), None) => {
                                s.pts(t);
                            }
                            (None, Some(tv)) => s.unify(tv, Cell::Unspecific),
                            (None, None) => (),
                        }
                    }
                    Opcode::Cast { operand } => s.unify_targets(func, i, *operand),
                    Opcode::Phi { incoming } => {
                        for (_, op) in incoming {
                            s.unify_targets(func, i, *op);
                        }
                    }
                    Opcode::Select {
                        true_value,
                        false_value,
                    } => {
                        s.unify_targets(func, i, *true_value);
                        s.unify_targets(func, i, *false_value);
                    }
                    Opcode::Opaque => {
                        let t = s.pts(Cell::Value(func, i));
                        s.unify(t, Cell::Unspecific);
                    }
                    Opcode::Ret { value: Some(v) } => {
                        let tr = s.pts(Cell::Ret(func));
                        if let Some(t) = s.target(func, *v) {
                            s.unify(tr, t);
                        }
                    }
                    Opcode::Call { callee, args } => {
                        let external = match callee {
                            Callee::Function(g) => {
                                let callee_f = module.function(*g);
                                for (p, a) in args.iter().enumerate() {
                                    let p = p as u32;
                                    if callee_f.params.get(p as usize).is_none() {
                                        continue;
                                    }
                                    if let Some(ta) = s.target(func, *a) {
                                        let tp = s.pts(Cell::Param(*g, p));
                                        s.unify(tp, ta);
                                    }
                                }
                                if callee_f.returns_pointer {
                                    let tx = s.pts(Cell::Value(func, i));
                                    let tr = s.pts(Cell::Ret(*g));
                                    s.unify(tx, tr);
                                }
                                None
                            }
                            Callee::Decl(d) => match &decl_sigs[d.index()] {
                                Some(sigs) => Some(External::Signatures(sigs)),
                                None => Some(External::Opaque),
                            },
                            Callee::Indirect(_) => Some(External::Opaque),
                            Callee::Asm => Some(External::Opaque),
                            Callee::Unknown(_) => Some(External::Opaque),
                        };
                        match external {
                            None => (),
                            Some(External::Signatures(sigs)) => {
                                Self::apply_signatures(&mut s, module, func, i, args, sigs)
                            }
                            Some(External::Opaque) => {
                                for a in args {
                                    if let Some(ta) = s.target(func, *a) {
                                        s.havoc(ta);
                                    }
                                }
                                for g in module.global_ids() {
                                    s.havoc(Cell::Global(g));
                                }
                                let tx = s.pts(Cell::Value(func, i));
                                s.unify(tx, Cell::Unspecific);
                            }
                        }
                    }
                    // No `_` pattern to ensure this is updated if the type changes
                    Opcode::Ret { value: None } => (),
                    Opcode::Br { .. } => (),
                    Opcode::Unreachable => (),
                    Opcode::Other => (),
                }
            }
        }

        Self::classify(module, &decl_sigs, s)
    }

    fn apply_signatures(
        s: &mut Solver,
        module: &Module,
        func: FuncId,
        call: InstId,
        args: &[Operand],
        sigs: &[Signature],
    ) {
        let arg = |s: &mut Solver, a: usize| args.get(a).and_then(|op| s.target(func, *op));
        for sig in sigs {
            match sig {
                Signature::ReturnAlloc { r#type } => {
                    let tx = s.pts(Cell::Value(func, call));
                    match r#type {
                        AllocType::Heap | AllocType::Stack => {
                            s.classes.insert(Cell::Alloc(func, call));
                            s.unify(tx, Cell::Alloc(func, call));
                        }
                        AllocType::Top => s.unify(tx, Cell::Unspecific),
                    }
                }
                Signature::ReturnAliasesArg { arg: a } => {
                    let tx = s.pts(Cell::Value(func, call));
                    match arg(s, *a) {
                        Some(ta) => s.unify(tx, ta),
                        None => s.unify(tx, Cell::Unspecific),
                    }
                }
                Signature::ReturnPointsToGlobal { global } => {
                    let tx = s.pts(Cell::Value(func, call));
                    match module.find_global(global) {
                        Some(g) => s.unify(tx, Cell::Global(g)),
                        None => s.unify(tx, Cell::Unspecific),
                    }
                }
                Signature::ArgMemcpyArg { dst, src } => {
                    if let (Some(td), Some(ts)) = (arg(s, *dst), arg(s, *src)) {
                        let cd = s.pts(td);
                        let cs = s.pts(ts);
                        s.unify(cd, cs);
                    }
                }
            }
        }
    }

    fn classify(module: &Module, decl_sigs: &[Option<Vec<Signature>>], mut s: Solver) -> Self {
        // Make sure every load and store pointer has a pointee before the
        // classes are frozen.
        for func in module.function_ids() {
            let f = module.function(func);
            for i in f.inst_ids() {
                match &f.instruction(i).opcode {
                    Opcode::Load { pointer } | Opcode::Store { pointer, .. } => {
                        if let Some(t) = s.target(func, *pointer) {
                            s.pts(t);
                        }
                    }
                    _ => (),
                }
            }
        }

        let mut memory: Vec<Cell> = s.classes.keys().filter(Cell::is_memory).collect();
        memory.sort();
        let mut ids: BTreeMap<Cell, ObjectId> = BTreeMap::new();
        let mut members: Vec<Vec<Cell>> = Vec::new();
        for c in &memory {
            let leader = s.classes.find(*c);
            let next = ObjectId(ids.len() as u32);
            let id = *ids.entry(leader).or_insert(next);
            if id == next {
                members.push(Vec::new());
            }
            members[id.0 as usize].push(*c);
        }
        let object = |s: &Solver, c: Cell| ids[&s.classes.find(c)];
        let unspecific = object(&s, Cell::Unspecific);

        let infos = members
            .iter()
            .map(|ms| Self::info(module, ms))
            .collect::<Vec<_>>();

        let reachable = |s: &Solver, roots: &mut dyn Iterator<Item = Cell>| -> ObjectSet {
            let mut seen = BTreeSet::new();
            let mut work: Vec<Cell> = roots.map(|c| s.classes.find(c)).collect();
            while let Some(c) = work.pop() {
                if seen.insert(ids[&c]) {
                    if let Some(p) = s.pointee(c) {
                        work.push(s.classes.find(p));
                    }
                }
            }
            seen
        };

        let globals = reachable(&s, &mut module.global_ids().map(Cell::Global));
        let global_storage = module
            .global_ids()
            .map(|g| object(&s, Cell::Global(g)))
            .collect();
        let contents = members
            .iter()
            .map(|ms| {
                ms.first()
                    .and_then(|c| s.pointee(*c))
                    .map(|p| object(&s, p))
            })
            .collect();
        let mut param_targets = Vec::with_capacity(module.functions.len());

        let mut allocs = FxHashMap::default();
        let mut accesses = Vec::with_capacity(module.functions.len());
        let mut params = Vec::with_capacity(module.functions.len());
        let mut objects = Vec::with_capacity(module.functions.len());
        for func in module.function_ids() {
            let f = module.function(func);
            let param_objs: Vec<ObjectSet> = (0..f.params.len() as u32)
                .map(|p| match s.pointee(Cell::Param(func, p)) {
                    Some(t) => reachable(&s, &mut std::iter::once(t)),
                    None => ObjectSet::new(),
                })
                .collect();
            param_targets.push(
                (0..f.params.len() as u32)
                    .map(|p| s.pointee(Cell::Param(func, p)).map(|t| object(&s, t)))
                    .collect(),
            );
            let target = |s: &Solver, op: Operand| -> Option<Cell> {
                match op {
                    Operand::Local(i) => s.pointee(Cell::Value(func, i)),
                    Operand::Param(p) => s.pointee(Cell::Param(func, p)),
                    Operand::Global(g) => Some(Cell::Global(g)),
                    Operand::Function(_) => None,
                    Operand::Decl(_) => None,
                    Operand::Null => None,
                    Operand::Undef => None,
                }
            };
            let through = |s: &Solver, op: Operand| -> ObjectSet {
                match target(s, op) {
                    Some(t) => ObjectSet::from([object(s, t)]),
                    None => ObjectSet::from([unspecific]),
                }
            };

            let mut fun_accesses = Vec::with_capacity(f.instrs.len());
            let mut all = ObjectSet::new();
            for i in f.inst_ids() {
                let access = match &f.instruction(i).opcode {
                    Opcode::Alloc { .. } => {
                        let o = object(&s, Cell::Alloc(func, i));
                        allocs.insert((func, i), o);
                        Access {
                            reads: ObjectSet::new(),
                            writes: ObjectSet::from([o]),
                        }
                    }
                    Opcode::Load { pointer } => Access {
                        reads: through(&s, *pointer),
                        writes: ObjectSet::new(),
                    },
                    Opcode::Store { pointer, .. } => Access {
                        reads: ObjectSet::new(),
                        writes: through(&s, *pointer),
                    },
                    Opcode::Call { callee, args } => {
                        let mut touched = reachable(
                            &s,
                            &mut args.iter().filter_map(|a| target(&s, *a)),
                        );
                        touched.extend(globals.iter().copied());
                        let opaque = match callee {
                            Callee::Function(_) => false,
                            Callee::Decl(d) => decl_sigs[d.index()].is_none(),
                            Callee::Indirect(_) => true,
                            Callee::Asm => true,
                            Callee::Unknown(_) => true,
                        };
                        if opaque {
                            touched.insert(unspecific);
                        }
                        // Calls with an allocating signature are allocation sites
                        if s.classes.contains(&Cell::Alloc(func, i)) {
                            allocs.insert((func, i), object(&s, Cell::Alloc(func, i)));
                        }
                        Access {
                            reads: touched.clone(),
                            writes: touched,
                        }
                    }
                    Opcode::Ret { value } => {
                        let mut reads: ObjectSet = param_objs.iter().flatten().copied().collect();
                        reads.extend(globals.iter().copied());
                        if let Some(t) = value.and_then(|v| target(&s, v)) {
                            reads.extend(reachable(&s, &mut std::iter::once(t)));
                        }
                        Access {
                            reads,
                            writes: ObjectSet::new(),
                        }
                    }
                    // No `_` pattern to ensure this is updated if the type changes
                    Opcode::Cast { .. } => Access::default(),
                    Opcode::Phi { .. } => Access::default(),
                    Opcode::Select { .. } => Access::default(),
                    Opcode::Opaque => Access::default(),
                    Opcode::Br { .. } => Access::default(),
                    Opcode::Unreachable => Access::default(),
                    Opcode::Other => Access::default(),
                };
                all.extend(access.touched());
                fun_accesses.push(access);
            }
            all.extend(param_objs.iter().flatten().copied());
            accesses.push(fun_accesses);
            params.push(param_objs);
            objects.push(all);
        }

        tracing::debug!("{} objects", infos.len());
        UnificationOracle {
            infos,
            unspecific,
            allocs,
            accesses,
            params,
            param_targets,
            globals,
            global_storage,
            contents,
            objects,
        }
    }

    fn info(module: &Module, members: &[Cell]) -> ObjectInfo {
        let mut kinds = BTreeSet::new();
        let mut captions = Vec::new();
        for m in members {
            match m {
                Cell::Unspecific => {
                    kinds.insert(ObjectKind::Unspecific);
                    captions.push("unspecific".to_string());
                }
                Cell::Global(g) => {
                    kinds.insert(ObjectKind::Global);
                    captions.push(module.globals[g.index()].name.to_string());
                }
                Cell::Alloc(f, i) => {
                    let func = module.function(*f);
                    let kind = match &func.instruction(*i).opcode {
                        Opcode::Alloc {
                            kind: AllocKind::Stack,
                        } => ObjectKind::Stack,
                        _ => ObjectKind::Heap,
                    };
                    kinds.insert(kind);
                    captions.push(format!("{}:{}", func.name, func.instruction(*i).name));
                }
                Cell::Deref(_) => {
                    kinds.insert(ObjectKind::External);
                }
                // Never memory
                Cell::Value(..) | Cell::Param(..) | Cell::Ret(_) => (),
            }
        }
        let kind = if kinds.contains(&ObjectKind::Unspecific) {
            ObjectKind::Unspecific
        } else if kinds.len() == 1 {
            kinds.into_iter().next().unwrap_or(ObjectKind::Mixed)
        } else {
            ObjectKind::Mixed
        };
        let caption = if captions.is_empty() {
            "external".to_string()
        } else {
            captions.join(", ")
        };
        ObjectInfo { caption, kind }
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl AliasOracle for UnificationOracle {
    fn objects(&self, func: FuncId) -> ObjectSet {
        self.objects[func.index()].clone()
    }

    fn access(&self, func: FuncId, inst: InstId) -> Access {
        self.accesses[func.index()][inst.index()].clone()
    }

    fn object_for_allocation(&self, func: FuncId, inst: InstId) -> Option<ObjectId> {
        self.allocs.get(&(func, inst)).copied()
    }

    fn param_objects(&self, func: FuncId, param: u32) -> ObjectSet {
        self.params[func.index()]
            .get(param as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn global_objects(&self) -> ObjectSet {
        self.globals.clone()
    }

    fn global_object(&self, g: GlobalId) -> ObjectId {
        self.global_storage[g.index()]
    }

    fn param_target(&self, func: FuncId, param: u32) -> Option<ObjectId> {
        self.param_targets[func.index()]
            .get(param as usize)
            .copied()
            .flatten()
    }

    fn contents(&self, obj: ObjectId) -> Option<ObjectId> {
        self.contents[obj.0 as usize]
    }

    fn unspecific(&self) -> ObjectId {
        self.unspecific
    }

    fn info(&self, obj: ObjectId) -> &ObjectInfo {
        &self.infos[obj.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle(json: &str) -> (Module, UnificationOracle) {
        let m = Module::from_json(json).unwrap();
        let o = UnificationOracle::new(&m, &Signatures::default());
        (m, o)
    }

    #[test]
    fn stores_unify_pointees() {
        let (m, o) = oracle(
            r#"{"globals": [{"name": "a"}, {"name": "b"}],
                "functions": [{"name": "f", "blocks": [
                  {"name": "entry", "instructions": [
                    {"name": "s", "op": "alloca"},
                    {"op": "store", "pointer": "%s", "value": "@a"},
                    {"op": "store", "pointer": "%s", "value": "@b"},
                    {"name": "t", "op": "alloca"},
                    {"name": "x", "op": "load", "pointer": "%s"},
                    {"op": "store", "pointer": "@a", "value": "null"},
                    {"op": "store", "pointer": "@b", "value": "null"},
                    {"op": "ret"}
                  ]}]}]}"#,
        );
        let f = m.find_function("f").unwrap();
        let store_a = o.access(f, InstId(1));
        let store_b = o.access(f, InstId(2));
        assert_eq!(store_a.writes, store_b.writes);
        let s = o.object_for_allocation(f, InstId(0)).unwrap();
        let t = o.object_for_allocation(f, InstId(3)).unwrap();
        assert_ne!(s, t);
        assert_eq!(store_a.writes, ObjectSet::from([s]));
        assert_eq!(o.access(f, InstId(4)).reads, ObjectSet::from([s]));
        assert_eq!(o.info(s).kind, ObjectKind::Stack);
        // @a and @b were stored into the same slot
        let a = o.access(f, InstId(5)).writes;
        assert_eq!(a, o.access(f, InstId(6)).writes);
        assert!(a.is_subset(&o.global_objects()));
        assert_eq!(o.info(o.unspecific()).kind, ObjectKind::Unspecific);
    }

    #[test]
    fn opaque_calls_touch_unspecific() {
        let (m, o) = oracle(
            r#"{"declarations": [{"name": "ext"}],
                "functions": [{"name": "f", "params": [{"name": "p"}], "blocks": [
                  {"name": "entry", "instructions": [
                    {"op": "call", "callee": "@ext", "args": ["%p"]},
                    {"op": "ret"}
                  ]}]}]}"#,
        );
        let f = m.find_function("f").unwrap();
        let call = o.access(f, InstId(0));
        assert!(call.writes.contains(&o.unspecific()));
        // Whatever %p points to now holds unspecific
        let params = o.param_objects(f, 0);
        assert!(params.contains(&o.unspecific()));
        assert!(o.objects(f).contains(&o.unspecific()));
    }

    #[test]
    fn loads_from_null_are_unspecific() {
        let (m, o) = oracle(
            r#"{"functions": [{"name": "f", "blocks": [
                  {"name": "entry", "instructions": [
                    {"name": "x", "op": "load", "pointer": "null"},
                    {"op": "ret"}
                  ]}]}]}"#,
        );
        let f = m.find_function("f").unwrap();
        assert_eq!(
            o.access(f, InstId(0)).reads,
            ObjectSet::from([o.unspecific()])
        );
        assert!(!o.is_empty());
    }

    #[test]
    fn parameter_targets_follow_arguments() {
        let (m, o) = oracle(
            r#"{"globals": [{"name": "g"}, {"name": "a"}, {"name": "h", "initializer": "@a"}],
                "functions": [
                  {"name": "f", "params": [{"name": "p"}, {"name": "q"}], "blocks": [
                    {"name": "entry", "instructions": [{"op": "ret"}]}]},
                  {"name": "main", "blocks": [
                    {"name": "entry", "instructions": [
                      {"name": "s", "op": "alloca"},
                      {"op": "call", "callee": "@f", "args": ["@g", "%s"]},
                      {"op": "ret"}]}]}]}"#,
        );
        let f = m.find_function("f").unwrap();
        let main = m.find_function("main").unwrap();
        let g = m.find_global("g").unwrap();
        let a = m.find_global("a").unwrap();
        let h = m.find_global("h").unwrap();
        assert_eq!(o.param_target(f, 0), Some(o.global_object(g)));
        assert_eq!(o.param_target(f, 1), o.object_for_allocation(main, InstId(0)));
        assert_eq!(o.param_target(f, 2), None);
        assert_eq!(o.contents(o.global_object(h)), Some(o.global_object(a)));
        assert_eq!(o.contents(o.unspecific()), Some(o.unspecific()));
    }
}

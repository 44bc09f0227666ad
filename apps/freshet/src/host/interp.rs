//! # Script Interpreter
//!
//! Executes parsed statements against a real heap while streaming every
//! observable action to the session's tracer.
//!
//! Values live in a heap keyed by [`ObjectId`], so aliasing works the way
//! it does in a live kernel: binding `ys = xs` shares one identity, and a
//! mutation through either name is a mutation of the shared object. The
//! interpreter never reuses an id, which keeps the engine's identity side
//! table honest without death notices per value; unreachable objects are
//! reported through [`Session::identity_discarded`] by the post-run sweep.

use super::HostError;
use super::parser::{BinOp, Builtin, Expr, Stmt};
use freshet_core::{CallArg, ObjectId, Session, SymbolFlags, SymbolName, TraceEvent};
use std::collections::{BTreeMap, BTreeSet};

/// Recursion guard for deep equality. Self-referencing containers are
/// expressible (`xs.append(xs)`), so comparisons must bottom out.
const EQ_DEPTH: usize = 32;

/// Recursion guard for rendering; deeper nesting prints `...`.
const RENDER_DEPTH: usize = 8;

// =============================================================================
// VALUES
// =============================================================================

/// A heap value. Containers hold identities, not values.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostValue {
    Int(i64),
    Str(String),
    List(Vec<ObjectId>),
    Map(BTreeMap<String, ObjectId>),
}

// =============================================================================
// INTERPRETER
// =============================================================================

/// Heap, environment, and captured output for one notebook.
#[derive(Debug)]
pub struct Interp {
    heap: BTreeMap<ObjectId, HostValue>,
    env: BTreeMap<String, ObjectId>,
    next_obj: u64,
    stdout: String,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    /// An empty interpreter. Object ids start at 1 and never recur.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BTreeMap::new(),
            env: BTreeMap::new(),
            next_obj: 1,
            stdout: String::new(),
        }
    }

    /// Drain everything `print` wrote since the last call.
    pub fn take_stdout(&mut self) -> String {
        std::mem::take(&mut self.stdout)
    }

    /// Execute one statement, streaming trace events into `session`.
    ///
    /// Must be called between `begin_statement` and `finish_statement`;
    /// on error the caller is expected to roll the statement back.
    pub fn exec(&mut self, session: &mut Session, stmt: &Stmt) -> Result<(), HostError> {
        match stmt {
            Stmt::Assign { target, value } => {
                let obj = self.eval(session, value)?;
                self.bind(session, target, obj)
            }
            Stmt::AugAssign { target, op, value } => {
                session.observe(TraceEvent::LoadName {
                    name: target.clone(),
                })?;
                let current = self.lookup(target)?;
                let rhs = self.eval(session, value)?;
                let obj = self.apply_binary(*op, current, rhs)?;
                self.bind(session, target, obj)
            }
            Stmt::SetElement { base, key, value } => {
                let obj = self.eval(session, value)?;
                session.observe(TraceEvent::LoadName { name: base.clone() })?;
                let owner = self.lookup(base)?;
                let key_obj = self.eval(session, key)?;
                let key_name = self.element_key(owner, key_obj)?;
                match (self.heap.get_mut(&owner), &key_name) {
                    (Some(HostValue::List(items)), SymbolName::Index(i)) => {
                        match items.get_mut(*i as usize) {
                            Some(slot) => *slot = obj,
                            None => {
                                return Err(HostError::Runtime(format!(
                                    "list index {i} out of range"
                                )));
                            }
                        }
                    }
                    (Some(HostValue::Map(pairs)), SymbolName::Key(k)) => {
                        pairs.insert(k.clone(), obj);
                    }
                    _ => {
                        return Err(HostError::Runtime(
                            "element assignment target is not a container".to_string(),
                        ));
                    }
                }
                session.observe(TraceEvent::StoreElement {
                    owner,
                    key: key_name,
                    obj,
                })?;
                Ok(())
            }
            Stmt::DelName { name } => {
                if !self.env.contains_key(name) {
                    return Err(HostError::Runtime(format!("name `{name}` is not defined")));
                }
                session.observe(TraceEvent::DeleteName { name: name.clone() })?;
                self.env.remove(name);
                Ok(())
            }
            Stmt::DelElement { base, key } => {
                session.observe(TraceEvent::LoadName { name: base.clone() })?;
                let owner = self.lookup(base)?;
                let key_obj = self.eval(session, key)?;
                let key_name = self.element_key(owner, key_obj)?;
                match (self.heap.get_mut(&owner), &key_name) {
                    (Some(HostValue::List(items)), SymbolName::Index(i)) => {
                        if (*i as usize) < items.len() {
                            items.remove(*i as usize);
                        } else {
                            return Err(HostError::Runtime(format!(
                                "list index {i} out of range"
                            )));
                        }
                    }
                    (Some(HostValue::Map(pairs)), SymbolName::Key(k)) => {
                        if pairs.remove(k).is_none() {
                            return Err(HostError::Runtime(format!("key \"{k}\" not found")));
                        }
                    }
                    _ => {
                        return Err(HostError::Runtime(
                            "deletion target is not a container".to_string(),
                        ));
                    }
                }
                session.observe(TraceEvent::DeleteElement {
                    owner,
                    key: key_name,
                })?;
                Ok(())
            }
            Stmt::MethodCall {
                receiver,
                method,
                args,
            } => {
                session.observe(TraceEvent::LoadName {
                    name: receiver.clone(),
                })?;
                let owner = self.lookup(receiver)?;
                let mut arg_objs = Vec::with_capacity(args.len());
                for arg in args {
                    arg_objs.push(self.eval(session, arg)?);
                }
                self.call_method(session, owner, method, &arg_objs)
            }
            Stmt::Print { args } => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    let obj = self.eval(session, arg)?;
                    rendered.push(self.render(obj));
                }
                self.stdout.push_str(&rendered.join(" "));
                self.stdout.push('\n');
                Ok(())
            }
            Stmt::Bare { value } => {
                self.eval(session, value)?;
                Ok(())
            }
        }
    }

    /// Drop heap entries no longer reachable from the environment and
    /// report each discarded identity to the engine.
    pub fn sweep(&mut self, session: &mut Session) -> usize {
        let mut live = BTreeSet::new();
        let mut stack: Vec<ObjectId> = self.env.values().copied().collect();
        while let Some(obj) = stack.pop() {
            if !live.insert(obj) {
                continue;
            }
            match self.heap.get(&obj) {
                Some(HostValue::List(items)) => stack.extend(items.iter().copied()),
                Some(HostValue::Map(pairs)) => stack.extend(pairs.values().copied()),
                _ => {}
            }
        }
        let dead: Vec<ObjectId> = self
            .heap
            .keys()
            .filter(|obj| !live.contains(*obj))
            .copied()
            .collect();
        for obj in &dead {
            self.heap.remove(obj);
            session.identity_discarded(*obj);
        }
        dead.len()
    }

    // =========================================================================
    // EVALUATION
    // =========================================================================

    fn eval(&mut self, session: &mut Session, expr: &Expr) -> Result<ObjectId, HostError> {
        match expr {
            Expr::Int(n) => Ok(self.alloc(HostValue::Int(*n))),
            Expr::Str(s) => Ok(self.alloc(HostValue::Str(s.clone()))),
            Expr::Name(name) => {
                session.observe(TraceEvent::LoadName { name: name.clone() })?;
                self.lookup(name)
            }
            Expr::Index { base, key } => {
                // A subscript read depends on the element it resolves to,
                // not on the container binding itself
                let owner = self.lookup(base)?;
                let key_obj = self.eval(session, key)?;
                let key_name = self.element_key(owner, key_obj)?;
                session.observe(TraceEvent::LoadElement {
                    owner,
                    key: key_name.clone(),
                })?;
                self.element_at(owner, &key_name)
            }
            Expr::List(items) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    ids.push(self.eval(session, item)?);
                }
                let owner = self.alloc(HostValue::List(ids.clone()));
                for (i, elem) in ids.iter().enumerate() {
                    session.observe(TraceEvent::StoreElement {
                        owner,
                        key: SymbolName::Index(i as i64),
                        obj: *elem,
                    })?;
                }
                Ok(owner)
            }
            Expr::Map(pairs) => {
                let mut entries = BTreeMap::new();
                for (key, value) in pairs {
                    let obj = self.eval(session, value)?;
                    // duplicate keys: last wins, traced once
                    entries.insert(key.clone(), obj);
                }
                let owner = self.alloc(HostValue::Map(entries.clone()));
                for (key, obj) in &entries {
                    session.observe(TraceEvent::StoreElement {
                        owner,
                        key: SymbolName::Key(key.clone()),
                        obj: *obj,
                    })?;
                }
                Ok(owner)
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(session, lhs)?;
                let right = self.eval(session, rhs)?;
                self.apply_binary(*op, left, right)
            }
            Expr::Call { func, arg } => {
                let obj = self.eval(session, arg)?;
                match func {
                    Builtin::Len => {
                        let n = match self.heap.get(&obj) {
                            Some(HostValue::List(items)) => items.len(),
                            Some(HostValue::Map(pairs)) => pairs.len(),
                            Some(HostValue::Str(s)) => s.chars().count(),
                            _ => {
                                return Err(HostError::Runtime(format!(
                                    "object of type `{}` has no len()",
                                    self.kind_of(obj)
                                )));
                            }
                        };
                        Ok(self.alloc(HostValue::Int(n as i64)))
                    }
                    Builtin::Sum => {
                        let items = self.list_items(obj).map_err(|_| {
                            HostError::Runtime(format!(
                                "sum() requires a list, got `{}`",
                                self.kind_of(obj)
                            ))
                        })?;
                        let mut total: i64 = 0;
                        for (i, elem) in items.iter().enumerate() {
                            session.observe(TraceEvent::LoadElement {
                                owner: obj,
                                key: SymbolName::Index(i as i64),
                            })?;
                            let value = self.int_of(*elem).map_err(|_| {
                                HostError::Runtime(
                                    "sum() requires an all-integer list".to_string(),
                                )
                            })?;
                            total = total
                                .checked_add(value)
                                .ok_or_else(|| HostError::Runtime("integer overflow".to_string()))?;
                        }
                        Ok(self.alloc(HostValue::Int(total)))
                    }
                    Builtin::Copy => {
                        let items = self.list_items(obj).map_err(|_| {
                            HostError::Runtime(format!(
                                "list() requires a list, got `{}`",
                                self.kind_of(obj)
                            ))
                        })?;
                        for (i, _) in items.iter().enumerate() {
                            session.observe(TraceEvent::LoadElement {
                                owner: obj,
                                key: SymbolName::Index(i as i64),
                            })?;
                        }
                        let copy = self.alloc(HostValue::List(items.clone()));
                        for (i, elem) in items.iter().enumerate() {
                            session.observe(TraceEvent::StoreElement {
                                owner: copy,
                                key: SymbolName::Index(i as i64),
                                obj: *elem,
                            })?;
                        }
                        Ok(copy)
                    }
                }
            }
        }
    }

    fn bind(
        &mut self,
        session: &mut Session,
        name: &str,
        obj: ObjectId,
    ) -> Result<(), HostError> {
        session.observe(TraceEvent::StoreName {
            name: name.to_string(),
            obj,
            flags: SymbolFlags::default(),
            type_note: Some(self.kind_of(obj).to_string()),
            import_origin: None,
        })?;
        self.env.insert(name.to_string(), obj);
        Ok(())
    }

    fn apply_binary(
        &mut self,
        op: BinOp,
        lhs: ObjectId,
        rhs: ObjectId,
    ) -> Result<ObjectId, HostError> {
        let result = match (self.heap.get(&lhs), self.heap.get(&rhs)) {
            (Some(HostValue::Int(a)), Some(HostValue::Int(b))) => {
                let value = match op {
                    BinOp::Add => a.checked_add(*b),
                    BinOp::Sub => a.checked_sub(*b),
                    BinOp::Mul => a.checked_mul(*b),
                }
                .ok_or_else(|| HostError::Runtime("integer overflow".to_string()))?;
                HostValue::Int(value)
            }
            (Some(HostValue::Str(a)), Some(HostValue::Str(b))) if op == BinOp::Add => {
                HostValue::Str(format!("{a}{b}"))
            }
            _ => {
                return Err(HostError::Runtime(format!(
                    "unsupported operand types for `{}`: `{}` and `{}`",
                    op_symbol(op),
                    self.kind_of(lhs),
                    self.kind_of(rhs),
                )));
            }
        };
        Ok(self.alloc(result))
    }

    // =========================================================================
    // METHOD CALLS
    // =========================================================================

    fn call_method(
        &mut self,
        session: &mut Session,
        owner: ObjectId,
        method: &str,
        args: &[ObjectId],
    ) -> Result<(), HostError> {
        let enter = |args: Vec<CallArg>| TraceEvent::CallEnter {
            callee: method.to_string(),
            receiver: Some(owner),
            args,
        };

        match (self.kind_of(owner), method) {
            ("list", "append") => {
                let &[elem] = args else {
                    return Err(arity(method, "exactly one argument", args.len()));
                };
                session.observe(enter(vec![CallArg::Obj(elem)]))?;
                self.list_mut(owner)?.push(elem);
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("list", "insert") => {
                let &[index_obj, elem] = args else {
                    return Err(arity(method, "exactly two arguments", args.len()));
                };
                let index = self.int_of(index_obj)?;
                let len = self.list_items(owner)?.len() as i64;
                let clamped = clamp_insert(len, index);
                session.observe(enter(vec![CallArg::Int(clamped), CallArg::Obj(elem)]))?;
                self.list_mut(owner)?.insert(clamped as usize, elem);
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("list", "extend") => {
                let &[src] = args else {
                    return Err(arity(method, "exactly one argument", args.len()));
                };
                let incoming = self.list_items(src).map_err(|_| {
                    HostError::Runtime("extend() requires a list argument".to_string())
                })?;
                session.observe(enter(vec![CallArg::Obj(src)]))?;
                self.list_mut(owner)?.extend(incoming);
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("list", "remove") => {
                let &[needle] = args else {
                    return Err(arity(method, "exactly one argument", args.len()));
                };
                let items = self.list_items(owner)?;
                let found = items
                    .iter()
                    .position(|elem| self.values_equal(*elem, needle, EQ_DEPTH));
                let Some(index) = found else {
                    return Err(HostError::Runtime(
                        "list.remove(x): x not in list".to_string(),
                    ));
                };
                let elem = items.get(index).copied().ok_or_else(|| {
                    HostError::Runtime("list.remove(x): x not in list".to_string())
                })?;
                session.observe(enter(vec![CallArg::Obj(elem)]))?;
                self.list_mut(owner)?.remove(index);
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("list", "pop") => {
                if args.len() > 1 {
                    return Err(arity(method, "at most one argument", args.len()));
                }
                let index = match args.first() {
                    Some(obj) => self.int_of(*obj)?,
                    None => -1,
                };
                let len = self.list_items(owner)?.len() as i64;
                if len == 0 {
                    return Err(HostError::Runtime("pop from empty list".to_string()));
                }
                let resolved = resolve_index(len, index).ok_or_else(|| {
                    HostError::Runtime(format!("pop index {index} out of range"))
                })?;
                let call_args = match args.first() {
                    Some(_) => vec![CallArg::Int(index)],
                    None => vec![],
                };
                session.observe(enter(call_args))?;
                let popped = self.list_mut(owner)?.remove(resolved as usize);
                session.observe(TraceEvent::CallReturn {
                    value: Some(popped),
                })?;
                Ok(())
            }
            ("list", "clear") => {
                if !args.is_empty() {
                    return Err(arity(method, "no arguments", args.len()));
                }
                session.observe(enter(vec![]))?;
                self.list_mut(owner)?.clear();
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("list", "sort") => {
                if !args.is_empty() {
                    return Err(arity(method, "no arguments", args.len()));
                }
                let items = self.list_items(owner)?;
                let mut keyed = Vec::with_capacity(items.len());
                for elem in items {
                    let value = self.int_of(elem).map_err(|_| {
                        HostError::Runtime("sort() requires an all-integer list".to_string())
                    })?;
                    keyed.push((value, elem));
                }
                session.observe(enter(vec![]))?;
                keyed.sort_by_key(|(value, _)| *value);
                *self.list_mut(owner)? = keyed.into_iter().map(|(_, obj)| obj).collect();
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("list", "reverse") => {
                if !args.is_empty() {
                    return Err(arity(method, "no arguments", args.len()));
                }
                session.observe(enter(vec![]))?;
                self.list_mut(owner)?.reverse();
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("map", "pop") => {
                let &[key_obj] = args else {
                    return Err(arity(method, "exactly one argument", args.len()));
                };
                let key = self.str_of(key_obj)?;
                if !self.map_contains(owner, &key)? {
                    return Err(HostError::Runtime(format!("key \"{key}\" not found")));
                }
                session.observe(enter(vec![CallArg::Str(key.clone())]))?;
                let removed = self.map_mut(owner)?.remove(&key);
                session.observe(TraceEvent::CallReturn { value: removed })?;
                Ok(())
            }
            ("map", "clear") => {
                if !args.is_empty() {
                    return Err(arity(method, "no arguments", args.len()));
                }
                session.observe(enter(vec![]))?;
                self.map_mut(owner)?.clear();
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            ("map", "update") => {
                let &[src] = args else {
                    return Err(arity(method, "exactly one argument", args.len()));
                };
                let pairs = self.map_pairs(src).map_err(|_| {
                    HostError::Runtime("update() requires a map argument".to_string())
                })?;
                session.observe(enter(vec![CallArg::Obj(src)]))?;
                self.map_mut(owner)?.extend(pairs);
                session.observe(TraceEvent::CallReturn { value: None })?;
                Ok(())
            }
            (kind, _) => Err(HostError::Runtime(format!(
                "`{kind}` object has no method `{method}()`"
            ))),
        }
    }

    // =========================================================================
    // HEAP HELPERS
    // =========================================================================

    fn alloc(&mut self, value: HostValue) -> ObjectId {
        let obj = ObjectId(self.next_obj);
        self.next_obj = self.next_obj.saturating_add(1);
        self.heap.insert(obj, value);
        obj
    }

    fn lookup(&self, name: &str) -> Result<ObjectId, HostError> {
        self.env
            .get(name)
            .copied()
            .ok_or_else(|| HostError::Runtime(format!("name `{name}` is not defined")))
    }

    fn kind_of(&self, obj: ObjectId) -> &'static str {
        match self.heap.get(&obj) {
            Some(HostValue::Int(_)) => "int",
            Some(HostValue::Str(_)) => "str",
            Some(HostValue::List(_)) => "list",
            Some(HostValue::Map(_)) => "map",
            None => "object",
        }
    }

    fn int_of(&self, obj: ObjectId) -> Result<i64, HostError> {
        match self.heap.get(&obj) {
            Some(HostValue::Int(n)) => Ok(*n),
            _ => Err(HostError::Runtime(format!(
                "expected an integer, got `{}`",
                self.kind_of(obj)
            ))),
        }
    }

    fn str_of(&self, obj: ObjectId) -> Result<String, HostError> {
        match self.heap.get(&obj) {
            Some(HostValue::Str(s)) => Ok(s.clone()),
            _ => Err(HostError::Runtime(format!(
                "expected a string, got `{}`",
                self.kind_of(obj)
            ))),
        }
    }

    fn list_items(&self, obj: ObjectId) -> Result<Vec<ObjectId>, HostError> {
        match self.heap.get(&obj) {
            Some(HostValue::List(items)) => Ok(items.clone()),
            _ => Err(HostError::Runtime(format!(
                "expected a list, got `{}`",
                self.kind_of(obj)
            ))),
        }
    }

    fn list_mut(&mut self, obj: ObjectId) -> Result<&mut Vec<ObjectId>, HostError> {
        match self.heap.get_mut(&obj) {
            Some(HostValue::List(items)) => Ok(items),
            _ => Err(HostError::Runtime("expected a list".to_string())),
        }
    }

    fn map_pairs(&self, obj: ObjectId) -> Result<Vec<(String, ObjectId)>, HostError> {
        match self.heap.get(&obj) {
            Some(HostValue::Map(pairs)) => {
                Ok(pairs.iter().map(|(k, v)| (k.clone(), *v)).collect())
            }
            _ => Err(HostError::Runtime(format!(
                "expected a map, got `{}`",
                self.kind_of(obj)
            ))),
        }
    }

    fn map_contains(&self, obj: ObjectId, key: &str) -> Result<bool, HostError> {
        match self.heap.get(&obj) {
            Some(HostValue::Map(pairs)) => Ok(pairs.contains_key(key)),
            _ => Err(HostError::Runtime(format!(
                "expected a map, got `{}`",
                self.kind_of(obj)
            ))),
        }
    }

    fn map_mut(&mut self, obj: ObjectId) -> Result<&mut BTreeMap<String, ObjectId>, HostError> {
        match self.heap.get_mut(&obj) {
            Some(HostValue::Map(pairs)) => Ok(pairs),
            _ => Err(HostError::Runtime("expected a map".to_string())),
        }
    }

    /// Resolve a key expression's value against a container, normalizing
    /// negative list positions so events always carry canonical keys.
    fn element_key(&self, owner: ObjectId, key_obj: ObjectId) -> Result<SymbolName, HostError> {
        match self.heap.get(&owner) {
            Some(HostValue::List(items)) => {
                let index = self.int_of(key_obj).map_err(|_| {
                    HostError::Runtime("list indices must be integers".to_string())
                })?;
                let resolved = resolve_index(items.len() as i64, index).ok_or_else(|| {
                    HostError::Runtime(format!("list index {index} out of range"))
                })?;
                Ok(SymbolName::Index(resolved))
            }
            Some(HostValue::Map(_)) => {
                let key = self.str_of(key_obj).map_err(|_| {
                    HostError::Runtime("map keys must be strings".to_string())
                })?;
                Ok(SymbolName::Key(key))
            }
            _ => Err(HostError::Runtime(format!(
                "`{}` object is not subscriptable",
                self.kind_of(owner)
            ))),
        }
    }

    fn element_at(&self, owner: ObjectId, key: &SymbolName) -> Result<ObjectId, HostError> {
        match (self.heap.get(&owner), key) {
            (Some(HostValue::List(items)), SymbolName::Index(i)) => items
                .get(*i as usize)
                .copied()
                .ok_or_else(|| HostError::Runtime(format!("list index {i} out of range"))),
            (Some(HostValue::Map(pairs)), SymbolName::Key(k)) => pairs
                .get(k)
                .copied()
                .ok_or_else(|| HostError::Runtime(format!("key \"{k}\" not found"))),
            _ => Err(HostError::Runtime("not a container".to_string())),
        }
    }

    fn values_equal(&self, a: ObjectId, b: ObjectId, depth: usize) -> bool {
        if a == b {
            return true;
        }
        if depth == 0 {
            return false;
        }
        match (self.heap.get(&a), self.heap.get(&b)) {
            (Some(HostValue::Int(x)), Some(HostValue::Int(y))) => x == y,
            (Some(HostValue::Str(x)), Some(HostValue::Str(y))) => x == y,
            (Some(HostValue::List(xs)), Some(HostValue::List(ys))) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|(x, y)| self.values_equal(*x, *y, depth - 1))
            }
            (Some(HostValue::Map(xm)), Some(HostValue::Map(ym))) => {
                xm.len() == ym.len()
                    && xm.iter().all(|(k, x)| {
                        ym.get(k)
                            .is_some_and(|y| self.values_equal(*x, *y, depth - 1))
                    })
            }
            _ => false,
        }
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    fn render(&self, obj: ObjectId) -> String {
        match self.heap.get(&obj) {
            Some(HostValue::Int(n)) => n.to_string(),
            Some(HostValue::Str(s)) => s.clone(),
            Some(_) => self.repr(obj, RENDER_DEPTH),
            None => "<gone>".to_string(),
        }
    }

    fn repr(&self, obj: ObjectId, depth: usize) -> String {
        if depth == 0 {
            return "...".to_string();
        }
        match self.heap.get(&obj) {
            Some(HostValue::Int(n)) => n.to_string(),
            Some(HostValue::Str(s)) => format!("\"{s}\""),
            Some(HostValue::List(items)) => {
                let inner: Vec<String> =
                    items.iter().map(|el| self.repr(*el, depth - 1)).collect();
                format!("[{}]", inner.join(", "))
            }
            Some(HostValue::Map(pairs)) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("\"{k}\": {}", self.repr(*v, depth - 1)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            None => "<gone>".to_string(),
        }
    }
}

// =============================================================================
// INDEX ARITHMETIC
// =============================================================================

/// Resolve a possibly-negative position against a length. `None` when out
/// of range.
fn resolve_index(len: i64, index: i64) -> Option<i64> {
    let resolved = if index < 0 { len + index } else { index };
    (resolved >= 0 && resolved < len).then_some(resolved)
}

/// Insert positions clamp to the ends instead of erroring.
fn clamp_insert(len: i64, index: i64) -> i64 {
    if index < 0 {
        (len + index).max(0)
    } else {
        index.min(len)
    }
}

fn arity(method: &str, wanted: &str, got: usize) -> HostError {
    HostError::Runtime(format!("{method}() takes {wanted}, got {got}"))
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
    }
}

// =============================================================================
// TESTS
// =============================================================================

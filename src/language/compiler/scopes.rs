use super::*;
use super::builtins::Builtin;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindClass {
    /// Slot in `Env::binds`.
    Obj,
    /// Raw 64-bit slot in `Env::int_binds`, for bool, int and float64.
    Int,
}

/// A variable declared in some frame, addressed by slot index.
#[derive(Clone, Debug)]
pub struct Bind {
    pub name: String,
    pub index: usize,
    pub class: BindClass,
    pub ty: Type,
}

impl Bind {
    pub fn load(&self, env: &Env) -> Value {
        match self.class {
            BindClass::Int => Value::from_bits(env.int_bind(self.index), &self.ty),
            BindClass::Obj => env.bind(self.index),
        }
    }

    pub fn store(&self, env: &Env, value: Value) {
        match self.class {
            BindClass::Int => env.set_int_bind(self.index, value.to_bits()),
            BindClass::Obj => env.set_bind(self.index, value),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Symbol {
    Var(Bind),
    Const(Value, Type),
    Type(Type),
    Builtin(Builtin),
}

/// Targets of `break` and `continue` for the innermost loop, switch or select
/// owning a frame.
#[derive(Clone, Debug, Default)]
pub(super) struct LoopInfo {
    pub break_to: Option<JumpTarget>,
    pub continue_to: Option<JumpTarget>,
    labels: Vec<String>,
}

impl LoopInfo {
    pub fn new(break_to: JumpTarget, continue_to: Option<JumpTarget>, labels: &[String]) -> Self {
        let mut labels = labels.to_vec();
        labels.sort();
        labels.dedup();
        Self {
            break_to: Some(break_to),
            continue_to,
            labels,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .is_ok()
    }
}

/// Result slots of the function owning a frame.
#[derive(Clone, Debug, Default)]
pub(super) struct FuncInfo {
    pub results: Vec<Bind>,
    pub named_results: bool,
}

/// Compile-time mirror of one lexical scope.
pub struct Comp<'a> {
    outer: Option<&'a Comp<'a>>,
    code: Code,
    symbols: HashMap<String, Symbol>,
    bind_num: usize,
    int_bind_num: usize,
    /// Runtime environments entered when control passes into this frame:
    /// 1 if it pushes one, 0 if it shares its parent's.
    up_cost: usize,
    pub(super) loop_info: Option<LoopInfo>,
    pub(super) func_info: Option<FuncInfo>,
}

impl Comp<'static> {
    /// Root frame of a source file.
    pub fn new_file() -> Self {
        Comp {
            outer: None,
            code: Code::new(),
            symbols: HashMap::new(),
            bind_num: 0,
            int_bind_num: 0,
            up_cost: 1,
            loop_info: None,
            func_info: None,
        }
    }
}

impl<'a> Comp<'a> {
    fn nested(&self, code: Code, up_cost: usize) -> Comp<'_> {
        Comp {
            outer: Some(self),
            code,
            symbols: HashMap::new(),
            bind_num: 0,
            int_bind_num: 0,
            up_cost,
            loop_info: None,
            func_info: None,
        }
    }

    /// Child frame backed by a pushed environment, sharing the stream.
    pub(super) fn child(&self) -> Comp<'_> {
        self.nested(self.code.clone(), 1)
    }

    /// Child frame that shares the parent's environment.
    pub(super) fn child_without_env(&self) -> Comp<'_> {
        self.nested(self.code.clone(), 0)
    }

    /// Root frame of a function body with its own stream.
    pub(super) fn func_child(&self) -> Comp<'_> {
        self.nested(Code::new(), 1)
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub(super) fn append(&self, stmt: Stmt, span: Span) {
        self.code.append(stmt, span);
    }

    pub fn bind_counts(&self) -> (usize, usize) {
        (self.bind_num, self.int_bind_num)
    }

    pub(super) fn up_cost(&self) -> usize {
        self.up_cost
    }

    pub(super) fn outer(&self) -> Option<&'a Comp<'a>> {
        self.outer
    }

    fn allocate(&mut self, name: String, ty: Type) -> Bind {
        let (class, index) = if ty.is_scalar() {
            self.int_bind_num += 1;
            (BindClass::Int, self.int_bind_num - 1)
        } else {
            self.bind_num += 1;
            (BindClass::Obj, self.bind_num - 1)
        };
        Bind {
            name,
            index,
            class,
            ty,
        }
    }

    /// Declares a variable in this frame. The blank identifier declares nothing.
    pub(super) fn declare_var(&mut self, name: &str, ty: Type, span: Span) -> CompileResult<Option<Bind>> {
        if name == "_" {
            return Ok(None);
        }
        if self.symbols.contains_key(name) {
            return Err(CompileError::Redeclared {
                name: name.to_string(),
                span,
            });
        }
        let bind = self.allocate(name.to_string(), ty);
        self.symbols.insert(name.to_string(), Symbol::Var(bind.clone()));
        Ok(Some(bind))
    }

    /// Slot invisible to the program, used for iteration state and unnamed results.
    pub(super) fn declare_hidden(&mut self, ty: Type) -> Bind {
        let name = format!("~hidden{}", self.bind_num + self.int_bind_num);
        self.allocate(name, ty)
    }

    pub(super) fn declare_symbol(&mut self, name: &str, symbol: Symbol, span: Span) -> CompileResult<()> {
        if name == "_" {
            return Ok(());
        }
        if self.symbols.contains_key(name) {
            return Err(CompileError::Redeclared {
                name: name.to_string(),
                span,
            });
        }
        self.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    /// Symbol declared directly in this frame.
    pub(super) fn local(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Variables declared directly in this frame, by name.
    pub(super) fn vars(&self) -> HashMap<String, Bind> {
        self.symbols
            .iter()
            .filter_map(|(name, symbol)| match symbol {
                Symbol::Var(bind) => Some((name.clone(), bind.clone())),
                _ => None,
            })
            .collect()
    }

    /// Resolves `name` outward, returning the environment hops to the frame
    /// that declares it.
    pub fn lookup(&self, name: &str) -> Option<(usize, Symbol)> {
        let mut upn = 0;
        let mut frame: Option<&Comp<'_>> = Some(self);
        while let Some(comp) = frame {
            if let Some(symbol) = comp.symbols.get(name) {
                return Some((upn, symbol.clone()));
            }
            upn += comp.up_cost;
            frame = comp.outer;
        }
        resolve::universe(name).map(|symbol| (0, symbol))
    }

    /// Enters a scope: when `flag` is set, emits an instruction pushing an
    /// environment sized once the scope is compiled.
    pub(super) fn push_env_if_flag(&self, flag: bool, span: Span) -> (Comp<'_>, Option<BindCounts>) {
        if !flag {
            return (self.child_without_env(), None);
        }
        let counts = BindCounts::new();
        let sizes = counts.clone();
        self.append(
            stmt(move |env| {
                let (binds, int_binds) = sizes.get();
                advance(env.push(binds, int_binds))
            }),
            span,
        );
        (self.child(), Some(counts))
    }

    pub(super) fn push_env_if_local_binds(&self, list: &[Statement], span: Span) -> (Comp<'_>, Option<BindCounts>) {
        self.push_env_if_flag(contains_local_binds(list), span)
    }

    pub(super) fn push_env_if_define(&self, node: &AssignStmt) -> (Comp<'_>, Option<BindCounts>) {
        self.push_env_if_flag(node.op == AssignOp::Define, node.span)
    }

    /// Leaves a scope entered by `push_env_if_flag`.
    pub(super) fn pop_env_if(self, counts: Option<BindCounts>, span: Span) -> CompileResult<()> {
        let (binds, int_binds) = self.bind_counts();
        match counts {
            Some(counts) => {
                if binds + int_binds == 0 {
                    return Err(CompileError::internal(
                        "scope pushed an environment but declared no bindings",
                        span,
                    ));
                }
                counts.set(binds, int_binds);
                self.append(stmt(|env| advance(env.pop())), span);
            }
            None if binds + int_binds != 0 => {
                return Err(CompileError::internal(
                    format!("scope without environment declared {binds} binds and {int_binds} int binds"),
                    span,
                ));
            }
            None => {}
        }
        Ok(())
    }
}

/// True if `list` directly declares a non-blank name, so that compiling it
/// needs its own runtime environment.
pub(super) fn contains_local_binds(list: &[Statement]) -> bool {
    list.iter().any(|node| match node {
        Statement::Assign(assign) => assign.op == AssignOp::Define,
        Statement::Decl(Decl::Func(func)) => !func.name.is_blank(),
        Statement::Decl(Decl::Var(specs, _)) => specs
            .iter()
            .any(|spec| spec.names.iter().any(|name| !name.is_blank())),
        _ => false,
    })
}

use super::closures::FuncTemplate;
use super::code::Program;
use super::*;

/// Output of compiling one source file: the initialisation program of its
/// environment and the slots of its package-level variables and functions.
#[derive(Debug)]
pub struct CompiledFile {
    pub program: Program,
    pub binds: usize,
    pub int_binds: usize,
    pub symbols: HashMap<String, Bind>,
}

/// Compiles `file` in a fresh file frame. `natives` are declared first, as
/// variables of their function type, and are filled in by the host.
///
/// Types, constants and function names are declared before any variable
/// initialiser is compiled, so initialisers may call any function. Function
/// bodies see every package-level name. At run time the functions are bound
/// first, then variables are initialised in source order, then `init`
/// functions run.
pub fn compile_file(file: &File, natives: &[(String, Arc<FuncType>)]) -> CompileResult<CompiledFile> {
    let mut comp = Comp::new_file();
    for (name, ty) in natives {
        comp.declare_var(name, Type::Func(ty.clone()), Span::default())?;
    }

    let mut funcs = Vec::new();
    let mut inits = Vec::new();
    for decl in &file.decls {
        match decl {
            Decl::Type(specs, _) => {
                for spec in specs {
                    comp.type_spec(spec)?;
                }
            }
            Decl::Const(specs, _) => {
                for spec in specs {
                    comp.const_spec(spec)?;
                }
            }
            Decl::Func(func) if func.name.name == "init" => {
                if !func.sig.params.is_empty() || !func.sig.results.is_empty() {
                    return Err(CompileError::invalid(
                        "func init must have no arguments and no return values",
                        func.span,
                    ));
                }
                inits.push(func);
            }
            Decl::Func(func) => {
                let ty = comp.resolve_signature(&func.sig, func.span)?;
                let bind = comp.declare_var(&func.name.name, Type::Func(Arc::new(ty)), func.name.span)?;
                funcs.push((func, bind));
            }
            Decl::Var(..) => {}
        }
    }

    let mut var_inits = Vec::new();
    for decl in &file.decls {
        if let Decl::Var(specs, _) = decl {
            for spec in specs {
                var_inits.push((comp.var_spec(spec)?, spec.span));
            }
        }
    }

    for (func, bind) in funcs {
        let template = comp.compile_function(&func.name.name, &func.sig, &func.body, func.span)?;
        if let Some(bind) = bind {
            comp.append(bind_func(template, bind), func.span);
        }
    }
    for (stmt, span) in var_inits {
        comp.append(stmt, span);
    }
    for func in inits {
        let template = comp.compile_function("init", &func.sig, &func.body, func.span)?;
        comp.append(call_init(template), func.span);
    }

    let program = comp.code().freeze();
    let (binds, int_binds) = comp.bind_counts();
    debug!(
        decls = file.decls.len(),
        instructions = program.len(),
        binds,
        int_binds,
        "compiled file"
    );
    Ok(CompiledFile {
        program,
        binds,
        int_binds,
        symbols: comp.vars(),
    })
}

fn bind_func(template: Arc<FuncTemplate>, bind: Bind) -> Stmt {
    stmt(move |env| {
        bind.store(&env, Value::Func(template.instantiate(&env)));
        advance(env)
    })
}

fn call_init(template: Arc<FuncTemplate>) -> Stmt {
    stmt(move |env| {
        let func = template.instantiate(&env);
        match func.call(env.thread(), Vec::new()) {
            Ok(_) => advance(env),
            Err(err) => raise(env, err),
        }
    })
}

impl<'a> Comp<'a> {
    /// Declaration inside a function body.
    pub(super) fn decl(&mut self, decl: &Decl) -> CompileResult<()> {
        match decl {
            Decl::Var(specs, _) => {
                for spec in specs {
                    let init = self.var_spec(spec)?;
                    self.append(init, spec.span);
                }
            }
            Decl::Const(specs, _) => {
                for spec in specs {
                    self.const_spec(spec)?;
                }
            }
            Decl::Type(specs, _) => {
                for spec in specs {
                    self.type_spec(spec)?;
                }
            }
            Decl::Func(func) => {
                let ty = self.resolve_signature(&func.sig, func.span)?;
                // declared before the body so that it can call itself
                let bind = self.declare_var(&func.name.name, Type::Func(Arc::new(ty)), func.name.span)?;
                let template = self.compile_function(&func.name.name, &func.sig, &func.body, func.span)?;
                if let Some(bind) = bind {
                    self.append(bind_func(template, bind), func.span);
                }
            }
        }
        Ok(())
    }

    fn type_spec(&mut self, spec: &TypeSpec) -> CompileResult<()> {
        let ty = self.resolve_type(&spec.ty, spec.span)?;
        self.declare_symbol(&spec.name.name, Symbol::Type(ty), spec.name.span)
    }

    fn const_spec(&mut self, spec: &ValueSpec) -> CompileResult<()> {
        if spec.values.len() != spec.names.len() {
            return Err(CompileError::invalid(
                format!(
                    "missing init expr for const declaration ({} names, {} values)",
                    spec.names.len(),
                    spec.values.len()
                ),
                spec.span,
            ));
        }
        let declared = self.declared_type(spec)?;
        for (name, value) in spec.names.iter().zip(&spec.values) {
            let mut value = self.expr(value)?;
            if let Some(ty) = &declared {
                value = value.convert_to(ty)?;
            }
            let ty = value.ty()?.clone();
            let Some(constant) = value.const_value() else {
                return Err(CompileError::invalid(
                    format!("{} is not constant", name.name),
                    value.span,
                ));
            };
            self.declare_symbol(&name.name, Symbol::Const(constant.clone(), ty), name.span)?;
        }
        Ok(())
    }

    fn declared_type(&self, spec: &ValueSpec) -> CompileResult<Option<Type>> {
        spec.ty
            .as_ref()
            .map(|ty| self.resolve_type(ty, spec.span))
            .transpose()
    }

    /// Compiles the initialiser of a `var` spec, then declares its names.
    /// The returned instruction stores the initial or zero values, every
    /// time it runs.
    pub(super) fn var_spec(&mut self, spec: &ValueSpec) -> CompileResult<Stmt> {
        let declared = self.declared_type(spec)?;
        let names = &spec.names;
        let values = self.exprs(&spec.values)?;

        let forwarded = match values.as_slice() {
            [single] if single.num_out() > 1 => Some(single.clone()),
            _ => None,
        };
        let (types, init): (Vec<Type>, XVFun) = if values.is_empty() {
            let Some(ty) = declared else {
                return Err(CompileError::invalid(
                    "missing type or init expr in variable declaration",
                    spec.span,
                ));
            };
            let zeros = vec![Value::zero(&ty); names.len()];
            (vec![ty; names.len()], Arc::new(move |_| Ok(zeros.clone())))
        } else if let Some(multi) = forwarded {
            if multi.num_out() != names.len() {
                return Err(assignment_mismatch(names.len(), multi.num_out(), spec.span));
            }
            let types = match &declared {
                Some(ty) => {
                    for actual in multi.types() {
                        if !actual.assignable_to(ty) {
                            return Err(CompileError::incompatible(ty, actual, spec.span));
                        }
                    }
                    vec![ty.clone(); names.len()]
                }
                None => multi.types().to_vec(),
            };
            (types, multi.as_xv())
        } else {
            if values.len() != names.len() {
                return Err(assignment_mismatch(names.len(), values.len(), spec.span));
            }
            let mut types = Vec::with_capacity(values.len());
            let mut funs = Vec::with_capacity(values.len());
            for value in values {
                let value = match &declared {
                    Some(ty) => value.convert_to(ty)?,
                    None => value,
                };
                let ty = value.ty()?.clone();
                if ty == Type::Nil {
                    return Err(CompileError::invalid(
                        "use of untyped nil in variable declaration",
                        value.span,
                    ));
                }
                types.push(ty);
                funs.push(value.as_x1());
            }
            let init: XVFun = Arc::new(move |env| funs.iter().map(|fun| fun(env)).collect());
            (types, init)
        };

        let binds = names
            .iter()
            .zip(types)
            .map(|(name, ty)| self.declare_var(&name.name, ty, name.span))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(stmt(move |env| match init(&env) {
            Ok(values) => {
                for (bind, value) in binds.iter().zip(values) {
                    if let Some(bind) = bind {
                        bind.store(&env, value);
                    }
                }
                advance(env)
            }
            Err(err) => raise(env, err),
        }))
    }
}

pub(super) fn assignment_mismatch(vars: usize, values: usize, span: Span) -> CompileError {
    CompileError::invalid(
        format!("assignment mismatch: {vars} variable(s) but {values} value(s)"),
        span,
    )
}

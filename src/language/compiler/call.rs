use super::*;

/// A call whose function value and arguments are evaluated separately from
/// the call itself, as `defer` and `go` require.
pub(super) struct Call {
    pub fun: XFun,
    pub args: XVFun,
    /// Arguments already hold the packed variadic slice.
    pub spread: bool,
    pub results: Vec<Type>,
    pub span: Span,
}

impl Call {
    /// Evaluates the function value and the arguments in `env`.
    pub fn evaluate(&self, env: &EnvRef) -> RuntimeResult<(Value, Vec<Value>)> {
        let fun = (self.fun)(env)?;
        let args = (self.args)(env)?;
        Ok((fun, args))
    }
}

/// Invokes an evaluated call.
pub(super) fn invoke(
    thread: &Arc<crate::runtime::environment::ThreadGlobals>,
    fun: Value,
    args: Vec<Value>,
    spread: bool,
) -> RuntimeResult<Vec<Value>> {
    match fun {
        Value::Func(fun) if spread => fun.call_slice(thread, args),
        Value::Func(fun) => fun.call(thread, args),
        _ => Err(RuntimeError::NilFunc),
    }
}

pub(super) fn call_expr(call: Call) -> CompiledExpr {
    let Call {
        fun,
        args,
        spread,
        results,
        span,
    } = call;
    let run: XVFun = Arc::new(move |env| {
        let callee = fun(env)?;
        let argv = args(env)?;
        invoke(env.thread(), callee, argv, spread)
    });
    match results.as_slice() {
        [ty] => CompiledExpr::single(
            ty.clone(),
            Arc::new(move |env| Ok(run(env)?.into_iter().next().unwrap_or(Value::Nil))),
            span,
        ),
        _ => CompiledExpr::multi(results, run, span),
    }
}

impl<'a> Comp<'a> {
    pub(super) fn call(
        &self,
        callee: &Expr,
        args: &[Expr],
        ellipsis: bool,
        span: Span,
    ) -> CompileResult<CompiledExpr> {
        match self.callee_kind(callee)? {
            CalleeKind::Builtin(builtin) => self.builtin_call(builtin, args, ellipsis, span),
            CalleeKind::Conversion(ty) => self.conversion(&ty, args, span),
            CalleeKind::Func => Ok(call_expr(self.func_call(callee, args, ellipsis, span)?)),
        }
    }

    /// Compiles the call expression of a `defer` or `go` statement.
    pub(super) fn prepare_call(&self, node: &Expr, keyword: &str) -> CompileResult<Call> {
        let Expr::Call {
            callee,
            args,
            ellipsis,
            span,
        } = node
        else {
            return Err(CompileError::invalid(
                format!("expression in {keyword} must be function call"),
                node.span(),
            ));
        };
        match self.callee_kind(callee)? {
            CalleeKind::Builtin(builtin) => self.builtin_as_call(builtin, args, *ellipsis, *span),
            CalleeKind::Conversion(ty) => Err(CompileError::invalid(
                format!("{keyword} requires function call, not conversion to {ty}"),
                *span,
            )),
            CalleeKind::Func => self.func_call(callee, args, *ellipsis, *span),
        }
    }

    fn callee_kind(&self, callee: &Expr) -> CompileResult<CalleeKind> {
        match callee {
            Expr::Identifier(ident) => Ok(match self.lookup(&ident.name) {
                Some((_, Symbol::Builtin(builtin))) => CalleeKind::Builtin(builtin),
                Some((_, Symbol::Type(ty))) => CalleeKind::Conversion(ty),
                _ => CalleeKind::Func,
            }),
            Expr::Type(ty, span) => Ok(CalleeKind::Conversion(self.resolve_type(ty, *span)?)),
            _ => Ok(CalleeKind::Func),
        }
    }

    fn func_call(&self, callee: &Expr, args: &[Expr], ellipsis: bool, span: Span) -> CompileResult<Call> {
        let fun = self.expr(callee)?;
        let ty = fun.ty()?.clone();
        let Type::Func(sig) = ty else {
            return Err(CompileError::invalid(
                format!("invalid operation: cannot call non-function (type {ty})"),
                span,
            ));
        };
        let args = self.call_args(&sig, args, ellipsis, span)?;
        Ok(Call {
            fun: fun.as_x1(),
            args,
            spread: ellipsis,
            results: sig.results.clone(),
            span,
        })
    }

    /// Type-checks the arguments against `sig`. A single multi-valued call
    /// is forwarded as the whole argument list.
    fn call_args(&self, sig: &FuncType, args: &[Expr], ellipsis: bool, span: Span) -> CompileResult<XVFun> {
        let compiled = self.exprs(args)?;
        if let [single] = compiled.as_slice() {
            if single.num_out() > 1 && !ellipsis {
                check_forwarded(sig, single.types(), span)?;
                return Ok(single.as_xv());
            }
        }
        let params = &sig.params;
        let fixed = if sig.variadic && !ellipsis {
            params.len() - 1
        } else {
            params.len()
        };
        if ellipsis && !sig.variadic {
            return Err(CompileError::invalid(
                format!("have (...) in call to non-variadic function {sig}"),
                span,
            ));
        }
        let arity_ok = if sig.variadic && !ellipsis {
            compiled.len() >= fixed
        } else {
            compiled.len() == fixed
        };
        if !arity_ok {
            let problem = if compiled.len() < fixed {
                "not enough"
            } else {
                "too many"
            };
            return Err(CompileError::invalid(
                format!(
                    "{problem} arguments in call (have {}, want {})",
                    compiled.len(),
                    params.len()
                ),
                span,
            ));
        }
        let funs = compiled
            .into_iter()
            .enumerate()
            .map(|(idx, arg)| {
                let target = match params.get(idx) {
                    Some(param) if idx < fixed => param.clone(),
                    _ => sig.variadic_elem().cloned().unwrap_or(Type::Any),
                };
                Ok(arg.convert_to(&target)?.as_x1())
            })
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Arc::new(move |env| funs.iter().map(|fun| fun(env)).collect()))
    }

    fn conversion(&self, target: &Type, args: &[Expr], span: Span) -> CompileResult<CompiledExpr> {
        let [arg] = args else {
            return Err(CompileError::invalid(
                format!("conversion to {target} needs exactly one argument"),
                span,
            ));
        };
        let arg = self.expr(arg)?;
        let from = arg.ty()?.clone();
        if from.assignable_to(target) {
            return arg.convert_to(target);
        }
        let convertible = matches!(
            (&from, target),
            (Type::Int | Type::Float, Type::Int | Type::Float) | (Type::Int, Type::String)
        );
        if !convertible {
            return Err(CompileError::invalid(
                format!("cannot convert expression of type {from} to type {target}"),
                span,
            ));
        }
        if let Some(value) = arg.const_value() {
            let value = convert_value(value.clone(), target)
                .map_err(|err| CompileError::invalid(err.to_string(), span))?;
            return Ok(CompiledExpr::constant(value, target.clone(), span));
        }
        let fun = arg.as_x1();
        let ty = target.clone();
        Ok(CompiledExpr::single(
            target.clone(),
            Arc::new(move |env| convert_value(fun(env)?, &ty)),
            span,
        ))
    }
}

enum CalleeKind {
    Builtin(super::builtins::Builtin),
    Conversion(Type),
    Func,
}

fn check_forwarded(sig: &FuncType, types: &[Type], span: Span) -> CompileResult<()> {
    let fixed = if sig.variadic {
        sig.params.len() - 1
    } else {
        sig.params.len()
    };
    let arity_ok = if sig.variadic {
        types.len() >= fixed
    } else {
        types.len() == fixed
    };
    if !arity_ok {
        return Err(CompileError::invalid(
            format!(
                "wrong argument count in call (have {}, want {})",
                types.len(),
                sig.params.len()
            ),
            span,
        ));
    }
    for (idx, ty) in types.iter().enumerate() {
        let target = if idx < fixed {
            &sig.params[idx]
        } else {
            sig.variadic_elem().unwrap_or(&Type::Any)
        };
        if !ty.assignable_to(target) {
            return Err(CompileError::incompatible(target, ty, span));
        }
    }
    Ok(())
}

fn convert_value(value: Value, target: &Type) -> RuntimeResult<Value> {
    match (value, target) {
        (Value::Int(n), Type::Float) => Ok(Value::Float(n as f64)),
        (Value::Float(f), Type::Int) => Ok(Value::Int(f as i64)),
        (Value::Int(n), Type::String) => {
            let ch = u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER);
            Ok(Value::string(ch.to_string()))
        }
        (value, _) => Ok(value),
    }
}

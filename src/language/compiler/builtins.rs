use super::call::{call_expr, Call};
use super::*;
use crate::runtime::{channel::ChanValue, environment::ThreadGlobals, value::NativeFn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Append,
    Cap,
    Close,
    Delete,
    Len,
    Make,
    Panic,
    Print,
    Println,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name {
            "append" => Builtin::Append,
            "cap" => Builtin::Cap,
            "close" => Builtin::Close,
            "delete" => Builtin::Delete,
            "len" => Builtin::Len,
            "make" => Builtin::Make,
            "panic" => Builtin::Panic,
            "print" => Builtin::Print,
            "println" => Builtin::Println,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Append => "append",
            Builtin::Cap => "cap",
            Builtin::Close => "close",
            Builtin::Delete => "delete",
            Builtin::Len => "len",
            Builtin::Make => "make",
            Builtin::Panic => "panic",
            Builtin::Print => "print",
            Builtin::Println => "println",
        }
    }
}

fn native<F>(imp: F) -> NativeFn
where
    F: Fn(&Arc<ThreadGlobals>, Vec<Value>) -> RuntimeResult<Vec<Value>> + Send + Sync + 'static,
{
    Arc::new(imp)
}

fn arity_error(builtin: Builtin, want: usize, have: usize, span: Span) -> CompileError {
    let problem = if have < want { "not enough" } else { "too many" };
    CompileError::invalid(
        format!(
            "{problem} arguments for {}() (have {have}, want {want})",
            builtin.name()
        ),
        span,
    )
}

impl<'a> Comp<'a> {
    pub(super) fn builtin_call(
        &self,
        builtin: Builtin,
        args: &[Expr],
        ellipsis: bool,
        span: Span,
    ) -> CompileResult<CompiledExpr> {
        if ellipsis && builtin != Builtin::Append {
            return Err(CompileError::invalid(
                format!("invalid use of ... with built-in {}", builtin.name()),
                span,
            ));
        }
        match builtin {
            Builtin::Len | Builtin::Cap => self.builtin_len(builtin, args, span),
            Builtin::Append => self.builtin_append(args, ellipsis, span),
            Builtin::Make => self.builtin_make(args, span),
            _ => Ok(call_expr(self.builtin_as_call(builtin, args, ellipsis, span)?)),
        }
    }

    /// Builtins without results, wrapped as a call of a host function so
    /// that `defer` and `go` can evaluate their arguments ahead of time.
    pub(super) fn builtin_as_call(
        &self,
        builtin: Builtin,
        args: &[Expr],
        ellipsis: bool,
        span: Span,
    ) -> CompileResult<Call> {
        if ellipsis {
            return Err(CompileError::invalid(
                format!("invalid use of ... with built-in {}", builtin.name()),
                span,
            ));
        }
        let (compiled, imp): (Vec<CompiledExpr>, NativeFn) = match builtin {
            Builtin::Close => {
                let [chan] = args else {
                    return Err(arity_error(builtin, 1, args.len(), span));
                };
                let chan = self.expr(chan)?;
                super::expr::send_elem(chan.ty()?, span)?;
                (
                    vec![chan],
                    native(|_, args| match args.first() {
                        Some(Value::Chan(chan)) => chan.close().map(|()| Vec::new()),
                        _ => Err(RuntimeError::panic("close of nil channel")),
                    }),
                )
            }
            Builtin::Delete => {
                let [map, key] = args else {
                    return Err(arity_error(builtin, 2, args.len(), span));
                };
                let map = self.expr(map)?;
                let Type::Map(key_ty, _) = map.ty()?.clone() else {
                    return Err(CompileError::invalid(
                        format!("invalid argument: {} is not a map", map.ty()?),
                        span,
                    ));
                };
                let key = self.expr(key)?.convert_to(&key_ty)?;
                (
                    vec![map, key],
                    native(|_, args| match args.as_slice() {
                        [Value::Map(map), key] => map.remove(key).map(|()| Vec::new()),
                        _ => Ok(Vec::new()),
                    }),
                )
            }
            Builtin::Panic => {
                let [arg] = args else {
                    return Err(arity_error(builtin, 1, args.len(), span));
                };
                (
                    vec![self.expr(arg)?.convert_to(&Type::Any)?],
                    native(|_, args| {
                        let message = args.first().map(ToString::to_string).unwrap_or_default();
                        Err(RuntimeError::panic(message))
                    }),
                )
            }
            Builtin::Print | Builtin::Println => {
                let compiled = args
                    .iter()
                    .map(|arg| self.expr(arg)?.convert_to(&Type::Any))
                    .collect::<CompileResult<Vec<_>>>()?;
                let newline = builtin == Builtin::Println;
                (
                    compiled,
                    native(move |thread, args| {
                        let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
                        let text = if newline {
                            parts.join(" ") + "\n"
                        } else {
                            parts.concat()
                        };
                        thread.globals().write(&text);
                        Ok(Vec::new())
                    }),
                )
            }
            Builtin::Append | Builtin::Cap | Builtin::Len | Builtin::Make => {
                return Err(CompileError::invalid(
                    format!("discards result of built-in {}", builtin.name()),
                    span,
                ))
            }
        };
        let params = compiled
            .iter()
            .map(|arg| arg.ty().cloned())
            .collect::<CompileResult<Vec<_>>>()?;
        let func = FuncValue::new(Arc::new(FuncType::new(params, Vec::new())), imp);
        let funs: Vec<XFun> = compiled.iter().map(CompiledExpr::as_x1).collect();
        Ok(Call {
            fun: Arc::new(move |_| Ok(Value::Func(func.clone()))),
            args: Arc::new(move |env| funs.iter().map(|fun| fun(env)).collect()),
            spread: false,
            results: Vec::new(),
            span,
        })
    }

    fn builtin_len(&self, builtin: Builtin, args: &[Expr], span: Span) -> CompileResult<CompiledExpr> {
        let [arg] = args else {
            return Err(arity_error(builtin, 1, args.len(), span));
        };
        let arg = self.expr(arg)?;
        let ty = arg.ty()?.clone();
        let valid = match builtin {
            Builtin::Len => matches!(ty, Type::String | Type::Slice(_) | Type::Map(..) | Type::Chan(..)),
            _ => matches!(ty, Type::Slice(_) | Type::Chan(..)),
        };
        if !valid {
            return Err(CompileError::invalid(
                format!("invalid argument: type {ty} for built-in {}", builtin.name()),
                span,
            ));
        }
        if let Some(Value::Str(text)) = arg.const_value() {
            return Ok(CompiledExpr::constant(Value::Int(text.len() as i64), Type::Int, span));
        }
        let fun = arg.as_x1();
        Ok(CompiledExpr::single(
            Type::Int,
            Arc::new(move |env| {
                let len = match (builtin, fun(env)?) {
                    (Builtin::Cap, Value::Chan(chan)) => chan.cap(),
                    (_, value) => value.len()?,
                };
                Ok(Value::Int(len as i64))
            }),
            span,
        ))
    }

    fn builtin_append(&self, args: &[Expr], ellipsis: bool, span: Span) -> CompileResult<CompiledExpr> {
        let Some((first, rest)) = args.split_first() else {
            return Err(arity_error(Builtin::Append, 1, 0, span));
        };
        let base = self.expr(first)?;
        let slice_ty = base.ty()?.clone();
        let Type::Slice(elem) = &slice_ty else {
            return Err(CompileError::invalid(
                format!("invalid argument: first argument to append must be a slice; have type {slice_ty}"),
                span,
            ));
        };
        let elem = (**elem).clone();
        let base = base.as_x1();
        if ellipsis {
            let [extra] = rest else {
                return Err(CompileError::invalid(
                    "can only use ... with final argument in list",
                    span,
                ));
            };
            let extra = self.expr(extra)?.convert_to(&slice_ty)?.as_x1();
            return Ok(CompiledExpr::single(
                slice_ty,
                Arc::new(move |env| {
                    let base = base(env)?;
                    let extra = match extra(env)? {
                        Value::Slice(slice) => slice.snapshot(),
                        _ => Vec::new(),
                    };
                    Ok(append_values(&elem, base, extra))
                }),
                span,
            ));
        }
        let funs = rest
            .iter()
            .map(|arg| Ok(self.expr(arg)?.convert_to(&elem)?.as_x1()))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(CompiledExpr::single(
            slice_ty,
            Arc::new(move |env| {
                let base = base(env)?;
                let extra = funs.iter().map(|fun| fun(env)).collect::<RuntimeResult<Vec<_>>>()?;
                Ok(append_values(&elem, base, extra))
            }),
            span,
        ))
    }

    fn builtin_make(&self, args: &[Expr], span: Span) -> CompileResult<CompiledExpr> {
        let Some((ty_arg, sizes)) = args.split_first() else {
            return Err(arity_error(Builtin::Make, 1, 0, span));
        };
        let Some(ty) = self.type_operand(ty_arg)? else {
            return Err(CompileError::invalid("invalid argument: nil is not a type", span));
        };
        if sizes.len() > 2 {
            return Err(arity_error(Builtin::Make, 2, sizes.len(), span));
        }
        let sizes = sizes
            .iter()
            .map(|size| Ok(self.expr(size)?.convert_to(&Type::Int)?.as_x1()))
            .collect::<CompileResult<Vec<_>>>()?;
        let size = sizes.first().cloned();
        match &ty {
            Type::Slice(elem) => {
                let Some(len) = size else {
                    return Err(CompileError::invalid(
                        format!("invalid operation: make({ty}) expects 2 or 3 arguments; found 1"),
                        span,
                    ));
                };
                let elem = (**elem).clone();
                Ok(CompiledExpr::single(
                    ty.clone(),
                    Arc::new(move |env| {
                        let len = usize::try_from(len(env)?.as_int()?)
                            .map_err(|_| RuntimeError::panic("makeslice: len out of range"))?;
                        Ok(SliceValue::from_vec(elem.clone(), vec![Value::zero(&elem); len]).into())
                    }),
                    span,
                ))
            }
            Type::Map(key, value) => {
                let (key, value) = ((**key).clone(), (**value).clone());
                Ok(CompiledExpr::single(
                    ty.clone(),
                    Arc::new(move |_| Ok(Value::Map(MapValue::new(key.clone(), value.clone())))),
                    span,
                ))
            }
            Type::Chan(_, elem) => {
                let elem = (**elem).clone();
                Ok(CompiledExpr::single(
                    ty.clone(),
                    Arc::new(move |env| {
                        let cap = match &size {
                            Some(size) => usize::try_from(size(env)?.as_int()?)
                                .map_err(|_| RuntimeError::panic("makechan: size out of range"))?,
                            None => 0,
                        };
                        Ok(Value::Chan(ChanValue::new(elem.clone(), cap)))
                    }),
                    span,
                ))
            }
            other => Err(CompileError::invalid(
                format!("invalid argument: cannot make {other}; type must be slice, map, or channel"),
                span,
            )),
        }
    }
}

fn append_values(elem: &Type, base: Value, extra: Vec<Value>) -> Value {
    match base {
        Value::Slice(slice) => slice.appended(extra).into(),
        _ => SliceValue::from_vec(elem.clone(), extra).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in ["append", "cap", "close", "delete", "len", "make", "panic", "print", "println"] {
            let builtin = Builtin::from_name(name).expect("builtin");
            assert_eq!(builtin.name(), name);
        }
        assert_eq!(Builtin::from_name("new"), None);
    }
}

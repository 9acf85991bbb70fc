use super::*;
use super::builtins::Builtin;

/// Predeclared identifiers, visible when no frame declares the name.
pub(super) fn universe(name: &str) -> Option<Symbol> {
    let symbol = match name {
        "true" => Symbol::Const(Value::Bool(true), Type::Bool),
        "false" => Symbol::Const(Value::Bool(false), Type::Bool),
        "nil" => Symbol::Const(Value::Nil, Type::Nil),
        "bool" => Symbol::Type(Type::Bool),
        "int" => Symbol::Type(Type::Int),
        "float64" => Symbol::Type(Type::Float),
        "string" => Symbol::Type(Type::String),
        "any" => Symbol::Type(Type::Any),
        other => return Builtin::from_name(other).map(Symbol::Builtin),
    };
    Some(symbol)
}

/// Assignable location, resolved at compile time.
#[derive(Clone)]
pub(super) enum Place {
    Var { upn: usize, bind: Bind },
    Index { base: XFun, index: XFun, container: Type },
    Blank,
}

/// A place whose operands have been evaluated.
pub(super) enum Bound {
    Var(EnvRef, Bind),
    SliceElem(SliceValue, i64),
    MapEntry(MapValue, Value),
    NilMap(Type),
    NilSlice(i64),
    Blank,
}

impl Place {
    /// Type stored through the place; `None` for the blank identifier.
    pub fn ty(&self) -> Option<Type> {
        match self {
            Place::Var { bind, .. } => Some(bind.ty.clone()),
            Place::Index { container, .. } => container.elem().cloned(),
            Place::Blank => None,
        }
    }

    pub fn prepare(&self, env: &EnvRef) -> RuntimeResult<Bound> {
        match self {
            Place::Var { upn, bind } => Ok(Bound::Var(env.up(*upn).clone(), bind.clone())),
            Place::Index {
                base,
                index,
                container,
            } => {
                let base = base(env)?;
                let index = index(env)?;
                match base {
                    Value::Slice(slice) => Ok(Bound::SliceElem(slice, index.as_int()?)),
                    Value::Map(map) => Ok(Bound::MapEntry(map, index)),
                    Value::Nil if matches!(container, Type::Map(..)) => {
                        Ok(Bound::NilMap(container.elem().cloned().unwrap_or(Type::Any)))
                    }
                    Value::Nil => Ok(Bound::NilSlice(index.as_int()?)),
                    other => Err(RuntimeError::mismatch(format!(
                        "cannot index {}",
                        other.type_name()
                    ))),
                }
            }
            Place::Blank => Ok(Bound::Blank),
        }
    }
}

impl Bound {
    pub fn load(&self) -> RuntimeResult<Value> {
        match self {
            Bound::Var(env, bind) => Ok(bind.load(env)),
            Bound::SliceElem(slice, index) => slice.get(*index),
            Bound::MapEntry(map, key) => Ok(map
                .get(key)?
                .unwrap_or_else(|| Value::zero(&map.value))),
            Bound::NilMap(elem) => Ok(Value::zero(elem)),
            Bound::NilSlice(index) => Err(RuntimeError::IndexOutOfRange {
                index: *index,
                len: 0,
            }),
            Bound::Blank => Err(RuntimeError::internal("read through the blank identifier")),
        }
    }

    pub fn store(&self, value: Value) -> RuntimeResult<()> {
        match self {
            Bound::Var(env, bind) => {
                bind.store(env, value);
                Ok(())
            }
            Bound::SliceElem(slice, index) => slice.set(*index, value),
            Bound::MapEntry(map, key) => map.insert(key, value),
            Bound::NilMap(_) => Err(RuntimeError::NilMap),
            Bound::NilSlice(index) => Err(RuntimeError::IndexOutOfRange {
                index: *index,
                len: 0,
            }),
            Bound::Blank => Ok(()),
        }
    }
}

/// Place of a variable declared in the current frame.
pub(super) fn local_place(bind: Option<Bind>) -> Place {
    match bind {
        Some(bind) => Place::Var { upn: 0, bind },
        None => Place::Blank,
    }
}

impl<'a> Comp<'a> {
    pub(super) fn place(&self, node: &Expr) -> CompileResult<Place> {
        match node {
            Expr::Identifier(ident) if ident.is_blank() => Ok(Place::Blank),
            Expr::Identifier(ident) => match self.lookup(&ident.name) {
                Some((upn, Symbol::Var(bind))) => Ok(Place::Var { upn, bind }),
                Some(_) => Err(CompileError::invalid(
                    format!("cannot assign to {}", ident.name),
                    ident.span,
                )),
                None => Err(CompileError::Undefined {
                    name: ident.name.clone(),
                    span: ident.span,
                }),
            },
            Expr::Index { base, index, span } => {
                let base = self.expr(base)?;
                let container = base.ty()?.clone();
                let index = match &container {
                    Type::Slice(_) => self.expr(index)?.convert_to(&Type::Int)?,
                    Type::Map(key, _) => self.expr(index)?.convert_to(key)?,
                    Type::String => {
                        return Err(CompileError::invalid(
                            "cannot assign to string index (strings are immutable)",
                            *span,
                        ))
                    }
                    other => {
                        return Err(CompileError::invalid(
                            format!("cannot index expression of type {other}"),
                            *span,
                        ))
                    }
                };
                Ok(Place::Index {
                    base: base.as_x1(),
                    index: index.as_x1(),
                    container,
                })
            }
            other => Err(CompileError::invalid(
                "cannot assign to expression",
                other.span(),
            )),
        }
    }

    /// A type in expression position; `None` for `nil`, as allowed in type
    /// switch cases.
    pub(super) fn type_operand(&self, node: &Expr) -> CompileResult<Option<Type>> {
        match node {
            Expr::Type(ty, span) => self.resolve_type(ty, *span).map(Some),
            Expr::Identifier(ident) => match self.lookup(&ident.name) {
                Some((_, Symbol::Type(ty))) => Ok(Some(ty)),
                Some((_, Symbol::Const(Value::Nil, _))) => Ok(None),
                Some(_) => Err(CompileError::invalid(
                    format!("{} is not a type", ident.name),
                    ident.span,
                )),
                None => Err(CompileError::Undefined {
                    name: ident.name.clone(),
                    span: ident.span,
                }),
            },
            other => Err(CompileError::invalid("expression is not a type", other.span())),
        }
    }

    pub(super) fn resolve_type(&self, node: &TypeExpr, span: Span) -> CompileResult<Type> {
        match node {
            TypeExpr::Named(name) => match self.lookup(name) {
                Some((_, Symbol::Type(ty))) => Ok(ty),
                Some(_) => Err(CompileError::invalid(format!("{name} is not a type"), span)),
                None => Err(CompileError::Undefined {
                    name: name.clone(),
                    span,
                }),
            },
            TypeExpr::Slice(elem) => Ok(Type::slice(self.resolve_type(elem, span)?)),
            TypeExpr::Map(key, value) => {
                let key = self.resolve_type(key, span)?;
                if !matches!(key, Type::Bool | Type::Int | Type::String) {
                    return Err(CompileError::invalid(format!("invalid map key type {key}"), span));
                }
                Ok(Type::map(key, self.resolve_type(value, span)?))
            }
            TypeExpr::Chan(dir, elem) => Ok(Type::Chan(*dir, Arc::new(self.resolve_type(elem, span)?))),
            TypeExpr::Func(sig) => Ok(Type::Func(Arc::new(self.resolve_signature(sig, span)?))),
        }
    }

    pub(super) fn resolve_signature(&self, sig: &FuncTypeExpr, span: Span) -> CompileResult<FuncType> {
        let mut params = Vec::with_capacity(sig.params.len());
        for (idx, field) in sig.params.iter().enumerate() {
            let ty = self.resolve_type(&field.ty, span)?;
            if sig.variadic && idx + 1 == sig.params.len() {
                params.push(Type::slice(ty));
            } else {
                params.push(ty);
            }
        }
        let results = sig
            .results
            .iter()
            .map(|field| self.resolve_type(&field.ty, span))
            .collect::<CompileResult<Vec<_>>>()?;
        let mut func = FuncType::new(params, results);
        func.variadic = sig.variadic;
        Ok(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_knows_predeclared_names() {
        assert!(matches!(universe("int"), Some(Symbol::Type(Type::Int))));
        assert!(matches!(universe("nil"), Some(Symbol::Const(Value::Nil, Type::Nil))));
        assert!(matches!(universe("len"), Some(Symbol::Builtin(_))));
        assert!(universe("lenx").is_none());
    }
}

use super::*;

pub type XFun = Arc<dyn Fn(&EnvRef) -> RuntimeResult<Value> + Send + Sync>;
pub type XVFun = Arc<dyn Fn(&EnvRef) -> RuntimeResult<Vec<Value>> + Send + Sync>;
pub type PredFun = Arc<dyn Fn(&EnvRef) -> RuntimeResult<bool> + Send + Sync>;

/// A condition, folded when it is constant.
pub enum Pred {
    Const(bool),
    Fun(PredFun),
}

#[derive(Clone)]
enum ExprCode {
    Const(Value),
    Single(XFun),
    Multi(XVFun),
}

/// Compiled expression: its static result types and the code producing them.
#[derive(Clone)]
pub struct CompiledExpr {
    types: Vec<Type>,
    code: ExprCode,
    pub span: Span,
}

impl CompiledExpr {
    pub fn constant(value: Value, ty: Type, span: Span) -> Self {
        Self {
            types: vec![ty],
            code: ExprCode::Const(value),
            span,
        }
    }

    pub fn single(ty: Type, fun: XFun, span: Span) -> Self {
        Self {
            types: vec![ty],
            code: ExprCode::Single(fun),
            span,
        }
    }

    pub fn multi(types: Vec<Type>, fun: XVFun, span: Span) -> Self {
        Self {
            types,
            code: ExprCode::Multi(fun),
            span,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.code, ExprCode::Const(_))
    }

    pub fn const_value(&self) -> Option<&Value> {
        match &self.code {
            ExprCode::Const(value) => Some(value),
            _ => None,
        }
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn num_out(&self) -> usize {
        self.types.len()
    }

    pub fn ty(&self) -> CompileResult<&Type> {
        match self.types.as_slice() {
            [ty] => Ok(ty),
            [] => Err(CompileError::invalid(
                "function call with no result used as value",
                self.span,
            )),
            many => Err(CompileError::invalid(
                format!(
                    "multiple-value expression ({} values) in single-value context",
                    many.len()
                ),
                self.span,
            )),
        }
    }

    pub fn as_x1(&self) -> XFun {
        match &self.code {
            ExprCode::Const(value) => {
                let value = value.clone();
                Arc::new(move |_| Ok(value.clone()))
            }
            ExprCode::Single(fun) => fun.clone(),
            ExprCode::Multi(fun) => {
                let fun = fun.clone();
                Arc::new(move |env| Ok(fun(env)?.into_iter().next().unwrap_or(Value::Nil)))
            }
        }
    }

    pub fn as_xv(&self) -> XVFun {
        match &self.code {
            ExprCode::Const(value) => {
                let value = value.clone();
                Arc::new(move |_| Ok(vec![value.clone()]))
            }
            ExprCode::Single(fun) => {
                let fun = fun.clone();
                Arc::new(move |env| Ok(vec![fun(env)?]))
            }
            ExprCode::Multi(fun) => fun.clone(),
        }
    }

    pub fn try_as_pred(&self) -> CompileResult<Pred> {
        let ty = self.ty()?;
        if *ty != Type::Bool {
            return Err(CompileError::invalid(
                format!("non-boolean condition (type {ty})"),
                self.span,
            ));
        }
        if let ExprCode::Const(value) = &self.code {
            return match value {
                Value::Bool(flag) => Ok(Pred::Const(*flag)),
                other => Err(CompileError::internal(
                    format!("boolean constant holds {}", other.type_name()),
                    self.span,
                )),
            };
        }
        let fun = self.as_x1();
        Ok(Pred::Fun(Arc::new(move |env| fun(env)?.as_bool())))
    }

    /// Instruction evaluating the expression for its side effects.
    pub fn as_stmt(&self) -> Stmt {
        match &self.code {
            ExprCode::Const(_) => stmt(advance),
            ExprCode::Single(fun) => {
                let fun = fun.clone();
                stmt(move |env| match fun(&env) {
                    Ok(_) => advance(env),
                    Err(err) => raise(env, err),
                })
            }
            ExprCode::Multi(fun) => {
                let fun = fun.clone();
                stmt(move |env| match fun(&env) {
                    Ok(_) => advance(env),
                    Err(err) => raise(env, err),
                })
            }
        }
    }

    /// Checks assignability to `target`, converting untyped-looking constants
    /// (integer literals to float64, `nil` to any nillable type).
    pub fn convert_to(mut self, target: &Type) -> CompileResult<Self> {
        let ty = self.ty()?.clone();
        if ty == *target {
            return Ok(self);
        }
        if let ExprCode::Const(Value::Int(value)) = &self.code {
            if *target == Type::Float {
                return Ok(Self::constant(Value::Float(*value as f64), Type::Float, self.span));
            }
        }
        if ty.assignable_to(target) {
            self.types = vec![target.clone()];
            return Ok(self);
        }
        Err(CompileError::incompatible(target, ty, self.span))
    }
}

impl<'a> Comp<'a> {
    pub fn expr(&self, node: &Expr) -> CompileResult<CompiledExpr> {
        match node {
            Expr::Identifier(ident) => self.identifier(ident),
            Expr::Literal(literal) => Ok(literal_expr(literal)),
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => self.binary(*op, left, right, *span),
            Expr::Unary { op, expr, span } => self.unary(*op, expr, *span),
            Expr::Call {
                callee,
                args,
                ellipsis,
                span,
            } => self.call(callee, args, *ellipsis, *span),
            Expr::FuncLit { sig, body, span } => self.func_lit(sig, body, *span),
            Expr::Index { base, index, span } => self.index(base, index, *span),
            Expr::SliceLiteral { elem, elems, span } => self.slice_literal(elem, elems, *span),
            Expr::MapLiteral {
                key,
                value,
                entries,
                span,
            } => self.map_literal(key, value, entries, *span),
            Expr::TypeAssert { expr, ty, span } => self.type_assert(expr, ty, *span),
            Expr::Type(ty, span) => {
                let ty = self.resolve_type(ty, *span)?;
                Err(CompileError::invalid(
                    format!("type {ty} is not an expression"),
                    *span,
                ))
            }
        }
    }

    pub(super) fn exprs(&self, nodes: &[Expr]) -> CompileResult<Vec<CompiledExpr>> {
        nodes.iter().map(|node| self.expr(node)).collect()
    }

    fn identifier(&self, ident: &Identifier) -> CompileResult<CompiledExpr> {
        if ident.is_blank() {
            return Err(CompileError::invalid("cannot use _ as value", ident.span));
        }
        match self.lookup(&ident.name) {
            Some((upn, Symbol::Var(bind))) => {
                let ty = bind.ty.clone();
                Ok(CompiledExpr::single(
                    ty,
                    Arc::new(move |env| Ok(bind.load(env.up(upn)))),
                    ident.span,
                ))
            }
            Some((_, Symbol::Const(value, ty))) => Ok(CompiledExpr::constant(value, ty, ident.span)),
            Some((_, Symbol::Type(ty))) => Err(CompileError::invalid(
                format!("type {ty} is not an expression"),
                ident.span,
            )),
            Some((_, Symbol::Builtin(_))) => Err(CompileError::invalid(
                format!("{} (built-in function) must be called", ident.name),
                ident.span,
            )),
            None => Err(CompileError::Undefined {
                name: ident.name.clone(),
                span: ident.span,
            }),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> CompileResult<CompiledExpr> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.logical(op, left, right, span);
        }
        let (left, right) = unify(self.expr(left)?, self.expr(right)?, op, span)?;
        let ty = left.ty()?.clone();
        check_operator(op, &ty, right.ty()?, span)?;
        let result = if op.is_comparison() { Type::Bool } else { ty };
        if let (Some(lhs), Some(rhs)) = (left.const_value(), right.const_value()) {
            let value = binary_op(op, lhs, rhs).map_err(|err| CompileError::invalid(err.to_string(), span))?;
            return Ok(CompiledExpr::constant(value, result, span));
        }
        let (lhs, rhs) = (left.as_x1(), right.as_x1());
        Ok(CompiledExpr::single(
            result,
            Arc::new(move |env| binary_op(op, &lhs(env)?, &rhs(env)?)),
            span,
        ))
    }

    /// `&&` and `||`, evaluating the right operand only when needed.
    fn logical(&self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> CompileResult<CompiledExpr> {
        let left = self.expr(left)?;
        let right = self.expr(right)?;
        for operand in [&left, &right] {
            let ty = operand.ty()?;
            if *ty != Type::Bool {
                return Err(CompileError::invalid(
                    format!("invalid operation: operator {} not defined on {ty}", op.symbol()),
                    operand.span,
                ));
            }
        }
        // `true && x` and `false || x` are just `x`
        let short = op == BinaryOp::Or;
        match left.try_as_pred()? {
            Pred::Const(flag) if flag == short => {
                Ok(CompiledExpr::constant(Value::Bool(short), Type::Bool, span))
            }
            Pred::Const(_) => Ok(right),
            Pred::Fun(lhs) => {
                let rhs = right.as_x1();
                Ok(CompiledExpr::single(
                    Type::Bool,
                    Arc::new(move |env| {
                        if lhs(env)? == short {
                            Ok(Value::Bool(short))
                        } else {
                            rhs(env)
                        }
                    }),
                    span,
                ))
            }
        }
    }

    fn unary(&self, op: UnaryOp, operand: &Expr, span: Span) -> CompileResult<CompiledExpr> {
        let operand = self.expr(operand)?;
        let ty = operand.ty()?.clone();
        match op {
            UnaryOp::Neg if !ty.is_numeric() => {
                return Err(CompileError::invalid(
                    format!("invalid operation: operator - not defined on {ty}"),
                    span,
                ))
            }
            UnaryOp::Not if ty != Type::Bool => {
                return Err(CompileError::invalid(
                    format!("invalid operation: operator ! not defined on {ty}"),
                    span,
                ))
            }
            UnaryOp::Recv => return self.receive(operand, span),
            _ => {}
        }
        if let Some(value) = operand.const_value() {
            let value = unary_op(op, value).map_err(|err| CompileError::invalid(err.to_string(), span))?;
            return Ok(CompiledExpr::constant(value, ty, span));
        }
        let fun = operand.as_x1();
        Ok(CompiledExpr::single(
            ty,
            Arc::new(move |env| unary_op(op, &fun(env)?)),
            span,
        ))
    }

    fn receive(&self, chan: CompiledExpr, span: Span) -> CompileResult<CompiledExpr> {
        let elem = recv_elem(chan.ty()?, span)?;
        let fun = chan.as_x1();
        Ok(CompiledExpr::single(
            elem,
            Arc::new(move |env| match fun(env)? {
                Value::Chan(chan) => Ok(chan.recv().0),
                _ => Err(RuntimeError::unsupported("receive from nil channel blocks forever")),
            }),
            span,
        ))
    }

    fn index(&self, base: &Expr, index: &Expr, span: Span) -> CompileResult<CompiledExpr> {
        let base = self.expr(base)?;
        let container = base.ty()?.clone();
        let base = base.as_x1();
        match &container {
            Type::Slice(elem) => {
                let index = self.expr(index)?.convert_to(&Type::Int)?.as_x1();
                Ok(CompiledExpr::single(
                    (**elem).clone(),
                    Arc::new(move |env| {
                        let index = index(env)?.as_int()?;
                        match base(env)? {
                            Value::Slice(slice) => slice.get(index),
                            _ => Err(RuntimeError::IndexOutOfRange { index, len: 0 }),
                        }
                    }),
                    span,
                ))
            }
            Type::String => {
                let index = self.expr(index)?.convert_to(&Type::Int)?.as_x1();
                Ok(CompiledExpr::single(
                    Type::Int,
                    Arc::new(move |env| {
                        let text = base(env)?;
                        let bytes = text.as_str()?.as_bytes();
                        let index = index(env)?.as_int()?;
                        let idx = crate::runtime::value::checked_index(index, bytes.len())?;
                        Ok(Value::Int(i64::from(bytes[idx])))
                    }),
                    span,
                ))
            }
            Type::Map(key, value) => {
                let key = self.expr(index)?.convert_to(key)?.as_x1();
                let value_ty = (**value).clone();
                let zero_ty = value_ty.clone();
                Ok(CompiledExpr::single(
                    value_ty,
                    Arc::new(move |env| {
                        let key = key(env)?;
                        match base(env)? {
                            Value::Map(map) => Ok(map.get(&key)?.unwrap_or_else(|| Value::zero(&zero_ty))),
                            _ => Ok(Value::zero(&zero_ty)),
                        }
                    }),
                    span,
                ))
            }
            other => Err(CompileError::invalid(
                format!("cannot index expression of type {other}"),
                span,
            )),
        }
    }

    fn slice_literal(&self, elem: &TypeExpr, elems: &[Expr], span: Span) -> CompileResult<CompiledExpr> {
        let elem = self.resolve_type(elem, span)?;
        let funs = elems
            .iter()
            .map(|node| Ok(self.expr(node)?.convert_to(&elem)?.as_x1()))
            .collect::<CompileResult<Vec<_>>>()?;
        let elem_ty = elem.clone();
        Ok(CompiledExpr::single(
            Type::slice(elem),
            Arc::new(move |env| {
                let items = funs.iter().map(|fun| fun(env)).collect::<RuntimeResult<Vec<_>>>()?;
                Ok(SliceValue::from_vec(elem_ty.clone(), items).into())
            }),
            span,
        ))
    }

    fn map_literal(
        &self,
        key: &TypeExpr,
        value: &TypeExpr,
        entries: &[MapLiteralEntry],
        span: Span,
    ) -> CompileResult<CompiledExpr> {
        let ty = self.resolve_type(&TypeExpr::map(key.clone(), value.clone()), span)?;
        let Type::Map(key_ty, value_ty) = &ty else {
            return Err(CompileError::internal("map literal resolved to a non-map type", span));
        };
        let funs = entries
            .iter()
            .map(|entry| {
                Ok((
                    self.expr(&entry.key)?.convert_to(key_ty)?.as_x1(),
                    self.expr(&entry.value)?.convert_to(value_ty)?.as_x1(),
                ))
            })
            .collect::<CompileResult<Vec<_>>>()?;
        let (key_ty, value_ty) = ((**key_ty).clone(), (**value_ty).clone());
        Ok(CompiledExpr::single(
            ty,
            Arc::new(move |env| {
                let map = MapValue::new(key_ty.clone(), value_ty.clone());
                for (key, value) in &funs {
                    map.insert(&key(env)?, value(env)?)?;
                }
                Ok(Value::Map(map))
            }),
            span,
        ))
    }

    fn type_assert(&self, subject: &Expr, target: &TypeExpr, span: Span) -> CompileResult<CompiledExpr> {
        let subject = self.interface_operand(subject)?;
        let target = self.resolve_type(target, span)?;
        let expected = target.clone();
        Ok(CompiledExpr::single(
            target,
            Arc::new(move |env| {
                let value = subject(env)?;
                if type_matches(&value, &expected) {
                    Ok(value)
                } else {
                    Err(assertion_failure(&value, &expected))
                }
            }),
            span,
        ))
    }

    pub(super) fn interface_operand(&self, node: &Expr) -> CompileResult<XFun> {
        let subject = self.expr(node)?;
        let ty = subject.ty()?;
        if !ty.is_interface() {
            return Err(CompileError::invalid(
                format!("invalid operation: subject (type {ty}) is not an interface"),
                node.span(),
            ));
        }
        Ok(subject.as_x1())
    }

    /// Two-valued forms `m[k]`, `<-ch` and `x.(T)` used with a trailing `ok`.
    pub(super) fn comma_ok(&self, node: &Expr) -> CompileResult<Option<CompiledExpr>> {
        match node {
            Expr::Index { base, index, span } => {
                let base = self.expr(base)?;
                let Type::Map(key_ty, value_ty) = base.ty()?.clone() else {
                    return Ok(None);
                };
                let key = self.expr(index)?.convert_to(&key_ty)?.as_x1();
                let base = base.as_x1();
                let zero_ty = (*value_ty).clone();
                Ok(Some(CompiledExpr::multi(
                    vec![(*value_ty).clone(), Type::Bool],
                    Arc::new(move |env| {
                        let key = key(env)?;
                        let found = match base(env)? {
                            Value::Map(map) => map.get(&key)?,
                            _ => None,
                        };
                        Ok(match found {
                            Some(value) => vec![value, Value::Bool(true)],
                            None => vec![Value::zero(&zero_ty), Value::Bool(false)],
                        })
                    }),
                    *span,
                )))
            }
            Expr::Unary {
                op: UnaryOp::Recv,
                expr,
                span,
            } => {
                let chan = self.expr(expr)?;
                let elem = recv_elem(chan.ty()?, *span)?;
                let fun = chan.as_x1();
                Ok(Some(CompiledExpr::multi(
                    vec![elem, Type::Bool],
                    Arc::new(move |env| match fun(env)? {
                        Value::Chan(chan) => {
                            let (value, ok) = chan.recv();
                            Ok(vec![value, Value::Bool(ok)])
                        }
                        _ => Err(RuntimeError::unsupported("receive from nil channel blocks forever")),
                    }),
                    *span,
                )))
            }
            Expr::TypeAssert { expr, ty, span } => {
                let subject = self.interface_operand(expr)?;
                let target = self.resolve_type(ty, *span)?;
                let expected = target.clone();
                Ok(Some(CompiledExpr::multi(
                    vec![target, Type::Bool],
                    Arc::new(move |env| {
                        let value = subject(env)?;
                        if type_matches(&value, &expected) {
                            Ok(vec![value, Value::Bool(true)])
                        } else {
                            Ok(vec![Value::zero(&expected), Value::Bool(false)])
                        }
                    }),
                    *span,
                )))
            }
            _ => Ok(None),
        }
    }
}

fn literal_expr(literal: &Literal) -> CompiledExpr {
    match literal {
        Literal::Int(value, span) => CompiledExpr::constant(Value::Int(*value), Type::Int, *span),
        Literal::Float(value, span) => CompiledExpr::constant(Value::Float(*value), Type::Float, *span),
        Literal::Bool(value, span) => CompiledExpr::constant(Value::Bool(*value), Type::Bool, *span),
        Literal::String(value, span) => CompiledExpr::constant(Value::string(value), Type::String, *span),
    }
}

/// Brings integer constants to float64 next to a float operand and checks
/// that both sides of the operator agree.
fn unify(
    left: CompiledExpr,
    right: CompiledExpr,
    op: BinaryOp,
    span: Span,
) -> CompileResult<(CompiledExpr, CompiledExpr)> {
    let (lt, rt) = (left.ty()?.clone(), right.ty()?.clone());
    if lt == rt {
        return Ok((left, right));
    }
    if lt == Type::Float && right.const_value().is_some() && rt == Type::Int {
        return Ok((left, right.convert_to(&Type::Float)?));
    }
    if rt == Type::Float && left.const_value().is_some() && lt == Type::Int {
        return Ok((left.convert_to(&Type::Float)?, right));
    }
    let equality = matches!(op, BinaryOp::Eq | BinaryOp::NotEq);
    if equality && (rt.assignable_to(&lt) || lt.assignable_to(&rt)) {
        return Ok((left, right));
    }
    Err(CompileError::invalid(
        format!("invalid operation: mismatched types {lt} and {rt}"),
        span,
    ))
}

pub(super) fn check_operator(op: BinaryOp, ty: &Type, other: &Type, span: Span) -> CompileResult<()> {
    let allowed = match op {
        BinaryOp::Add => matches!(ty, Type::Int | Type::Float | Type::String),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => ty.is_numeric(),
        BinaryOp::Rem | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => *ty == Type::Int,
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            matches!(ty, Type::Int | Type::Float | Type::String)
        }
        BinaryOp::Eq | BinaryOp::NotEq => {
            (ty.is_comparable() && other.is_comparable()) || *ty == Type::Nil || *other == Type::Nil
        }
        BinaryOp::And | BinaryOp::Or => *ty == Type::Bool,
    };
    if allowed {
        Ok(())
    } else {
        Err(CompileError::invalid(
            format!("invalid operation: operator {} not defined on {ty}", op.symbol()),
            span,
        ))
    }
}

pub(super) fn recv_elem(ty: &Type, span: Span) -> CompileResult<Type> {
    match ty {
        Type::Chan(dir, elem) if dir.can_recv() => Ok((**elem).clone()),
        Type::Chan(..) => Err(CompileError::invalid(
            format!("invalid operation: cannot receive from send-only channel ({ty})"),
            span,
        )),
        other => Err(CompileError::invalid(
            format!("invalid operation: cannot receive from non-channel (type {other})"),
            span,
        )),
    }
}

pub(super) fn send_elem(ty: &Type, span: Span) -> CompileResult<Type> {
    match ty {
        Type::Chan(dir, elem) if dir.can_send() => Ok((**elem).clone()),
        Type::Chan(..) => Err(CompileError::invalid(
            format!("invalid operation: cannot send to receive-only channel ({ty})"),
            span,
        )),
        other => Err(CompileError::invalid(
            format!("invalid operation: cannot send to non-channel (type {other})"),
            span,
        )),
    }
}

/// Dynamic type test of type assertions and type switches.
pub(super) fn type_matches(value: &Value, ty: &Type) -> bool {
    match ty {
        Type::Any => !value.is_nil(),
        Type::Nil => value.is_nil(),
        Type::Chan(_, elem) => matches!(value, Value::Chan(chan) if chan.elem() == &**elem),
        other => value.dynamic_type() == *other,
    }
}

fn assertion_failure(value: &Value, expected: &Type) -> RuntimeError {
    if value.is_nil() {
        RuntimeError::panic(format!("interface conversion: interface is nil, not {expected}"))
    } else {
        RuntimeError::panic(format!(
            "interface conversion: interface {{}} is {}, not {expected}",
            value.dynamic_type()
        ))
    }
}

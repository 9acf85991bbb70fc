use super::decl::assignment_mismatch;
use super::expr::check_operator;
use super::resolve::{local_place, Place};
use super::*;
use std::collections::HashSet;

/// Right-hand side of an assignment.
enum Rhs {
    /// One single-valued expression per target.
    Each(Vec<CompiledExpr>),
    /// One expression producing every value: a call or a comma-ok form.
    Multi(CompiledExpr),
}

impl<'a> Comp<'a> {
    pub(super) fn assign(&mut self, node: &AssignStmt) -> CompileResult<()> {
        match node.op {
            AssignOp::Define => self.define(node),
            AssignOp::Assign => self.assign_places(node),
            AssignOp::Compound(op) => {
                let ([lhs], [rhs]) = (node.lhs.as_slice(), node.rhs.as_slice()) else {
                    return Err(CompileError::invalid(
                        format!("assignment operation {}= requires single-valued expressions", op.symbol()),
                        node.span,
                    ));
                };
                self.op_assign(op, lhs, rhs, node.span)
            }
        }
    }

    pub(super) fn inc_dec(&mut self, node: &IncDecStmt) -> CompileResult<()> {
        let op = if node.increment {
            BinaryOp::Add
        } else {
            BinaryOp::Sub
        };
        self.op_assign(op, &node.target, &Expr::int(1), node.span)
    }

    /// `x op= y`: the place is evaluated once.
    fn op_assign(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, span: Span) -> CompileResult<()> {
        if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
            return Err(CompileError::invalid(
                format!("invalid assignment operator {}=", op.symbol()),
                span,
            ));
        }
        let place = self.place(lhs)?;
        let Some(ty) = place.ty() else {
            return Err(CompileError::invalid("cannot use _ as value", span));
        };
        check_operator(op, &ty, &ty, span)?;
        let value = self.expr(rhs)?.convert_to(&ty)?.as_x1();
        self.append(
            effect(move |env| {
                let bound = place.prepare(env)?;
                let current = bound.load()?;
                let operand = value(env)?;
                bound.store(binary_op(op, &current, &operand)?)
            }),
            span,
        );
        Ok(())
    }

    fn rhs(&self, rhs: &[Expr], count: usize, span: Span) -> CompileResult<Rhs> {
        if let [single] = rhs {
            if count == 2 {
                if let Some(pair) = self.comma_ok(single)? {
                    return Ok(Rhs::Multi(pair));
                }
            }
            let value = self.expr(single)?;
            if value.num_out() == 1 && count == 1 {
                return Ok(Rhs::Each(vec![value]));
            }
            if value.num_out() != count {
                return Err(assignment_mismatch(count, value.num_out(), span));
            }
            return Ok(Rhs::Multi(value));
        }
        if rhs.len() != count {
            return Err(assignment_mismatch(count, rhs.len(), span));
        }
        Ok(Rhs::Each(self.exprs(rhs)?))
    }

    /// `a, b[i] = x, y`: index operands on the left, then every value on the
    /// right, are evaluated before anything is stored.
    fn assign_places(&mut self, node: &AssignStmt) -> CompileResult<()> {
        let places = node
            .lhs
            .iter()
            .map(|target| self.place(target))
            .collect::<CompileResult<Vec<_>>>()?;
        let targets: Vec<Option<Type>> = places.iter().map(Place::ty).collect();
        let values = self.rhs(&node.rhs, places.len(), node.span)?;
        let values = convert_rhs(values, &targets, node.span)?;
        self.append(store_places(places, values), node.span);
        Ok(())
    }

    /// `a, b := x, y`: at least one name must be new to this scope; the
    /// others are assigned.
    fn define(&mut self, node: &AssignStmt) -> CompileResult<()> {
        let values = self.rhs(&node.rhs, node.lhs.len(), node.span)?;
        let types = match &values {
            Rhs::Each(values) => values
                .iter()
                .map(|value| value.ty().cloned())
                .collect::<CompileResult<Vec<_>>>()?,
            Rhs::Multi(value) => value.types().to_vec(),
        };

        let mut seen = HashSet::new();
        let mut fresh = false;
        let mut places = Vec::with_capacity(node.lhs.len());
        let mut targets = Vec::with_capacity(node.lhs.len());
        for (target, ty) in node.lhs.iter().zip(types) {
            let Some(ident) = target.as_identifier() else {
                return Err(CompileError::invalid(
                    "non-name on left side of :=",
                    target.span(),
                ));
            };
            if ty == Type::Nil {
                return Err(CompileError::invalid("use of untyped nil in assignment", ident.span));
            }
            if ident.is_blank() {
                places.push(Place::Blank);
                targets.push(None);
                continue;
            }
            if !seen.insert(ident.name.as_str()) {
                return Err(CompileError::invalid(
                    format!("{} repeated on left side of :=", ident.name),
                    ident.span,
                ));
            }
            match self.local(&ident.name) {
                Some(Symbol::Var(bind)) => {
                    targets.push(Some(bind.ty.clone()));
                    places.push(Place::Var {
                        upn: 0,
                        bind: bind.clone(),
                    });
                }
                Some(_) => {
                    return Err(CompileError::invalid(
                        format!("cannot assign to {}", ident.name),
                        ident.span,
                    ))
                }
                None => {
                    fresh = true;
                    targets.push(Some(ty.clone()));
                    places.push(local_place(self.declare_var(&ident.name, ty, ident.span)?));
                }
            }
        }
        if !fresh {
            return Err(CompileError::invalid(
                "no new variables on left side of :=",
                node.span,
            ));
        }
        let values = convert_rhs(values, &targets, node.span)?;
        self.append(store_places(places, values), node.span);
        Ok(())
    }
}

/// Checks every value against its target and packs the right-hand side
/// into one evaluation.
fn convert_rhs(values: Rhs, targets: &[Option<Type>], span: Span) -> CompileResult<XVFun> {
    match values {
        Rhs::Multi(value) => {
            for (actual, target) in value.types().iter().zip(targets) {
                if let Some(target) = target {
                    if !actual.assignable_to(target) {
                        return Err(CompileError::incompatible(target, actual, span));
                    }
                }
            }
            Ok(value.as_xv())
        }
        Rhs::Each(values) => {
            let funs = values
                .into_iter()
                .zip(targets)
                .map(|(value, target)| match target {
                    Some(target) => Ok(value.convert_to(target)?.as_x1()),
                    None if *value.ty()? == Type::Nil => Err(CompileError::invalid(
                        "use of untyped nil in assignment",
                        value.span,
                    )),
                    None => Ok(value.as_x1()),
                })
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(Arc::new(move |env| funs.iter().map(|fun| fun(env)).collect()))
        }
    }
}

fn store_places(places: Vec<Place>, values: XVFun) -> Stmt {
    effect(move |env| {
        let bound = places
            .iter()
            .map(|place| place.prepare(env))
            .collect::<RuntimeResult<Vec<_>>>()?;
        let values = values(env)?;
        for (place, value) in bound.iter().zip(values) {
            place.store(value)?;
        }
        Ok(())
    })
}

use super::emit::jump_to;
use super::expr::{recv_elem, send_elem};
use super::resolve::Place;
use super::scopes::LoopInfo;
use super::*;
use crate::runtime::channel::{self, SelectCase, Selected};

/// Communication of one `select` case, compiled.
enum CommOp {
    Send { chan: XFun, value: XFun },
    Recv { chan: XFun },
}

/// What a receive case does with the received value.
enum Receive {
    Discard,
    /// `v, ok := <-ch`; blank names declare nothing.
    Define {
        value: Option<Identifier>,
        ok: Option<Identifier>,
        elem: Type,
    },
    /// `v, ok = <-ch` into existing places.
    Assign { value: Place, ok: Option<Place> },
}

fn evaluate_cases(ops: &[CommOp], env: &EnvRef) -> RuntimeResult<Vec<SelectCase>> {
    ops.iter()
        .map(|op| {
            Ok(match op {
                CommOp::Send { chan, value } => {
                    let chan = chan(env)?;
                    let value = value(env)?;
                    match chan {
                        Value::Chan(chan) => SelectCase::Send(chan, value),
                        _ => SelectCase::Never,
                    }
                }
                CommOp::Recv { chan } => match chan(env)? {
                    Value::Chan(chan) => SelectCase::Recv(chan),
                    _ => SelectCase::Never,
                },
            })
        })
        .collect()
}

fn blank_to_none(ident: Option<&Identifier>) -> Option<Identifier> {
    ident.filter(|ident| !ident.is_blank()).cloned()
}

impl<'a> Comp<'a> {
    /// Evaluates every channel and sent value in source order, then lets the
    /// runtime pick one ready case. A received value and its `ok` flag are
    /// parked in hidden slots until the chosen clause takes them.
    pub(super) fn select(&mut self, node: &SelectStmt, labels: &[String]) -> CompileResult<()> {
        let mut default = None;
        let mut comm_clauses = Vec::new();
        for (idx, clause) in node.clauses.iter().enumerate() {
            match &clause.comm {
                None if default.is_some() => {
                    return Err(CompileError::invalid("multiple defaults in select", clause.span))
                }
                None => default = Some(idx),
                Some(comm) => comm_clauses.push((idx, &**comm)),
            }
        }
        let receives_values = comm_clauses.iter().any(|(_, comm)| matches!(comm, Statement::Assign(_)));
        let (mut frame, counts) = self.push_env_if_flag(receives_values, node.span);
        let break_to = JumpTarget::new();
        frame.loop_info = Some(LoopInfo::new(break_to.clone(), None, labels));

        let mut ops = Vec::with_capacity(comm_clauses.len());
        let mut receives = Vec::with_capacity(comm_clauses.len());
        for (_, comm) in &comm_clauses {
            let (op, receive) = frame.comm(comm)?;
            ops.push(op);
            receives.push(receive);
        }
        let parked = receives_values.then(|| (frame.declare_hidden(Type::Any), frame.declare_hidden(Type::Bool)));

        let starts: Vec<JumpTarget> = node.clauses.iter().map(|_| JumpTarget::new()).collect();
        let case_starts: Vec<JumpTarget> = comm_clauses.iter().map(|(idx, _)| starts[*idx].clone()).collect();
        let default_start = default.map(|idx| starts[idx].clone());
        let slots = parked.clone();
        frame.append(
            stmt(move |env| {
                let cases = match evaluate_cases(&ops, &env) {
                    Ok(cases) => cases,
                    Err(err) => return raise(env, err),
                };
                match channel::select(&cases, default_start.is_some()) {
                    Ok(Selected::Case { index, received }) => {
                        if let (Some((value_slot, ok_slot)), Some((value, ok))) = (&slots, received) {
                            value_slot.store(&env, value);
                            ok_slot.store(&env, Value::Bool(ok));
                        }
                        goto(env, case_starts[index].get())
                    }
                    Ok(Selected::Default) => match &default_start {
                        Some(start) => goto(env, start.get()),
                        None => raise(env, RuntimeError::internal("select chose a missing default")),
                    },
                    Err(err) => raise(env, err),
                }
            }),
            node.span,
        );

        let mut receives = receives.into_iter();
        for (idx, clause) in node.clauses.iter().enumerate() {
            starts[idx].set(frame.code().len());
            let receive = match clause.comm {
                Some(_) => receives.next().unwrap_or(Receive::Discard),
                None => Receive::Discard,
            };
            match (receive, &parked) {
                (Receive::Define { value, ok, elem }, Some((value_slot, ok_slot))) => {
                    let needs_env = value.is_some() || ok.is_some();
                    let (mut scope, scope_counts) = frame.push_env_if_flag(needs_env, clause.span);
                    let value_bind = match &value {
                        Some(ident) => scope.declare_var(&ident.name, elem, ident.span)?,
                        None => None,
                    };
                    let ok_bind = match &ok {
                        Some(ident) => scope.declare_var(&ident.name, Type::Bool, ident.span)?,
                        None => None,
                    };
                    if needs_env {
                        let (value_slot, ok_slot) = (value_slot.clone(), ok_slot.clone());
                        scope.append(
                            stmt(move |env| {
                                let parked = env.up(1).clone();
                                if let Some(bind) = &value_bind {
                                    bind.store(&env, value_slot.load(&parked));
                                }
                                if let Some(bind) = &ok_bind {
                                    bind.store(&env, ok_slot.load(&parked));
                                }
                                advance(env)
                            }),
                            clause.span,
                        );
                    }
                    if !clause.body.is_empty() {
                        scope.list(&clause.body)?;
                    }
                    scope.pop_env_if(scope_counts, clause.span)?;
                }
                (Receive::Assign { value, ok }, Some((value_slot, ok_slot))) => {
                    let (value_slot, ok_slot) = (value_slot.clone(), ok_slot.clone());
                    frame.append(
                        effect(move |env| {
                            let target = value.prepare(env)?;
                            let flag = ok.as_ref().map(|ok| ok.prepare(env)).transpose()?;
                            target.store(value_slot.load(env))?;
                            if let Some(flag) = flag {
                                flag.store(ok_slot.load(env))?;
                            }
                            Ok(())
                        }),
                        clause.span,
                    );
                    frame.block_opt(&clause.body, clause.span)?;
                }
                _ => frame.block_opt(&clause.body, clause.span)?,
            }
            frame.append(jump_to(break_to.clone()), clause.span);
        }
        break_to.set(frame.code().len());
        frame.pop_env_if(counts, node.span)
    }

    fn comm(&self, comm: &Statement) -> CompileResult<(CommOp, Receive)> {
        match comm {
            Statement::Send(send) => {
                let chan = self.expr(&send.channel)?;
                let elem = send_elem(chan.ty()?, send.span)?;
                let value = self.expr(&send.value)?.convert_to(&elem)?.as_x1();
                Ok((
                    CommOp::Send {
                        chan: chan.as_x1(),
                        value,
                    },
                    Receive::Discard,
                ))
            }
            Statement::Expr(Expr::Unary {
                op: UnaryOp::Recv,
                expr,
                ..
            }) => {
                let chan = self.expr(expr)?;
                recv_elem(chan.ty()?, expr.span())?;
                Ok((CommOp::Recv { chan: chan.as_x1() }, Receive::Discard))
            }
            Statement::Assign(assign) => {
                let chan_expr = match (assign.rhs.as_slice(), assign.op) {
                    (
                        [Expr::Unary {
                            op: UnaryOp::Recv,
                            expr,
                            ..
                        }],
                        AssignOp::Assign | AssignOp::Define,
                    ) if (1..=2).contains(&assign.lhs.len()) => expr,
                    _ => {
                        return Err(CompileError::invalid(
                            "select case must be receive, send or assign recv",
                            assign.span,
                        ))
                    }
                };
                let chan = self.expr(chan_expr)?;
                let elem = recv_elem(chan.ty()?, assign.span)?;
                let op = CommOp::Recv { chan: chan.as_x1() };
                let receive = if assign.op == AssignOp::Define {
                    let mut names = assign.lhs.iter().map(Expr::as_identifier);
                    let (Some(value), ok) = (names.next().flatten(), names.next()) else {
                        return Err(CompileError::invalid("non-name on left side of :=", assign.span));
                    };
                    let ok = match ok {
                        Some(Some(ident)) => Some(ident),
                        Some(None) => {
                            return Err(CompileError::invalid("non-name on left side of :=", assign.span))
                        }
                        None => None,
                    };
                    Receive::Define {
                        value: blank_to_none(Some(value)),
                        ok: blank_to_none(ok),
                        elem,
                    }
                } else {
                    let value = self.place(&assign.lhs[0])?;
                    if let Some(target) = value.ty() {
                        if !elem.assignable_to(&target) {
                            return Err(CompileError::incompatible(target, &elem, assign.span));
                        }
                    }
                    let ok = assign.lhs.get(1).map(|target| self.place(target)).transpose()?;
                    if let Some(target) = ok.as_ref().and_then(Place::ty) {
                        if !Type::Bool.assignable_to(&target) {
                            return Err(CompileError::incompatible(target, Type::Bool, assign.span));
                        }
                    }
                    Receive::Assign { value, ok }
                };
                Ok((op, receive))
            }
            other => Err(CompileError::invalid(
                "select case must be receive, send or assign recv",
                other.span(),
            )),
        }
    }
}

use super::emit::{init_frame, jump_to};
use super::expr::type_matches;
use super::scopes::LoopInfo;
use super::*;

/// Splits a trailing `fallthrough` off a clause body.
fn split_fallthrough(body: &[Statement]) -> (&[Statement], bool) {
    match body.split_last() {
        Some((Statement::Branch(branch), rest)) if branch.kind == BranchKind::Fallthrough => (rest, true),
        _ => (body, false),
    }
}

fn default_clause(clauses: &[CaseClause], keyword: &str) -> CompileResult<Option<usize>> {
    let mut default = None;
    for (idx, clause) in clauses.iter().enumerate() {
        if clause.list.is_none() {
            if default.is_some() {
                return Err(CompileError::invalid(
                    format!("multiple defaults in {keyword}"),
                    clause.span,
                ));
            }
            default = Some(idx);
        }
    }
    Ok(default)
}

impl<'a> Comp<'a> {
    /// Expression switch. A single dispatch instruction evaluates the tag
    /// once, then the case expressions in source order until one is equal,
    /// and jumps to the start of that clause.
    pub(super) fn switch(&mut self, node: &SwitchStmt, labels: &[String]) -> CompileResult<()> {
        let (mut init, counts) = init_frame(self, node.init.as_deref(), node.span);
        if let Some(stmt) = &node.init {
            init.stmt(stmt)?;
        }
        let break_to = JumpTarget::new();
        init.loop_info = Some(LoopInfo::new(break_to.clone(), None, labels));

        let tag = match &node.tag {
            Some(tag) => init.expr(tag)?,
            None => CompiledExpr::constant(Value::Bool(true), Type::Bool, node.span),
        };
        let tag_ty = tag.ty()?.clone();
        let default = default_clause(&node.clauses, "switch")?;
        let starts: Vec<JumpTarget> = node.clauses.iter().map(|_| JumpTarget::new()).collect();

        let mut cases = Vec::new();
        for (idx, clause) in node.clauses.iter().enumerate() {
            for case in clause.list.iter().flatten() {
                let value = init.expr(case)?;
                let ty = value.ty()?.clone();
                let value = if ty.assignable_to(&tag_ty) || (tag_ty == Type::Float && value.is_const()) {
                    value.convert_to(&tag_ty)?
                } else if tag_ty.assignable_to(&ty) {
                    value
                } else {
                    return Err(CompileError::invalid(
                        format!("invalid case in switch on tag (mismatched types {ty} and {tag_ty})"),
                        case.span(),
                    ));
                };
                cases.push((value.as_x1(), starts[idx].clone()));
            }
        }

        let tag = tag.as_x1();
        let fallback = default.map_or_else(|| break_to.clone(), |idx| starts[idx].clone());
        init.append(
            stmt(move |env| {
                let tag = match tag(&env) {
                    Ok(tag) => tag,
                    Err(err) => return raise(env, err),
                };
                for (case, start) in &cases {
                    match case(&env) {
                        Ok(value) if value.equals(&tag) => return goto(env, start.get()),
                        Ok(_) => {}
                        Err(err) => return raise(env, err),
                    }
                }
                goto(env, fallback.get())
            }),
            node.span,
        );

        let last = node.clauses.len().saturating_sub(1);
        for (idx, clause) in node.clauses.iter().enumerate() {
            starts[idx].set(init.code().len());
            let (body, fallthrough) = split_fallthrough(&clause.body);
            if fallthrough && idx == last {
                return Err(CompileError::MisplacedFallthrough {
                    reason: "cannot fallthrough final case in switch",
                    span: clause.span,
                });
            }
            init.block_opt(body, clause.span)?;
            let next = if fallthrough {
                starts[idx + 1].clone()
            } else {
                break_to.clone()
            };
            init.append(jump_to(next), clause.span);
        }
        break_to.set(init.code().len());
        init.pop_env_if(counts, node.span)
    }

    /// Type switch. With a binding, the dispatcher parks the subject in a
    /// hidden slot and each clause copies it into a variable of its own,
    /// typed after the clause when it names exactly one type.
    pub(super) fn type_switch(&mut self, node: &TypeSwitchStmt, labels: &[String]) -> CompileResult<()> {
        let binding = node.binding.as_ref().filter(|ident| !ident.is_blank());
        let needs_env = super::emit::defines(node.init.as_deref()) || binding.is_some();
        let (mut init, counts) = self.push_env_if_flag(needs_env, node.span);
        if let Some(stmt) = &node.init {
            init.stmt(stmt)?;
        }
        let break_to = JumpTarget::new();
        init.loop_info = Some(LoopInfo::new(break_to.clone(), None, labels));

        let subject = init.interface_operand(&node.subject)?;
        let default = default_clause(&node.clauses, "type switch")?;
        let starts: Vec<JumpTarget> = node.clauses.iter().map(|_| JumpTarget::new()).collect();

        let mut entries = Vec::new();
        let mut clause_types = Vec::with_capacity(node.clauses.len());
        for (idx, clause) in node.clauses.iter().enumerate() {
            let mut listed = Vec::new();
            for case in clause.list.iter().flatten() {
                let ty = init.type_operand(case)?;
                entries.push((ty.clone(), starts[idx].clone()));
                listed.push(ty);
            }
            clause_types.push(match listed.as_slice() {
                [Some(ty)] => ty.clone(),
                _ => Type::Any,
            });
        }

        let parked = binding.map(|_| init.declare_hidden(Type::Any));
        let slot = parked.clone();
        let fallback = default.map_or_else(|| break_to.clone(), |idx| starts[idx].clone());
        init.append(
            stmt(move |env| {
                let value = match subject(&env) {
                    Ok(value) => value,
                    Err(err) => return raise(env, err),
                };
                let target = entries
                    .iter()
                    .find(|(ty, _)| match ty {
                        Some(ty) => type_matches(&value, ty),
                        None => value.is_nil(),
                    })
                    .map_or_else(|| fallback.get(), |(_, start)| start.get());
                if let Some(slot) = &slot {
                    slot.store(&env, value);
                }
                goto(env, target)
            }),
            node.span,
        );

        for (idx, clause) in node.clauses.iter().enumerate() {
            starts[idx].set(init.code().len());
            if matches!(split_fallthrough(&clause.body), (_, true)) {
                return Err(CompileError::MisplacedFallthrough {
                    reason: "cannot fallthrough in type switch",
                    span: clause.span,
                });
            }
            match (binding, &parked) {
                (Some(ident), Some(parked)) => {
                    let (mut scope, scope_counts) = init.push_env_if_flag(true, clause.span);
                    if let Some(bind) = scope.declare_var(&ident.name, clause_types[idx].clone(), ident.span)? {
                        let parked = parked.clone();
                        scope.append(
                            stmt(move |env| {
                                let value = parked.load(env.up(1));
                                bind.store(&env, value);
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
                _ => init.block_opt(&clause.body, clause.span)?,
            }
            init.append(jump_to(break_to.clone()), clause.span);
        }
        break_to.set(init.code().len());
        init.pop_env_if(counts, node.span)
    }
}

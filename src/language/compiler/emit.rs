use super::call::invoke;
use super::code::Program;
use super::expr::{send_elem, PredFun};
use super::scopes::{FuncInfo, LoopInfo};
use super::*;

/// True if `init` declares variables with `:=`, so the statement owning it
/// needs an environment of its own.
pub(super) fn defines(init: Option<&Statement>) -> bool {
    matches!(init, Some(Statement::Assign(assign)) if assign.op == AssignOp::Define)
}

/// Conditional jump: falls through when `pred` holds, else goes to `target`.
fn jump_unless(pred: PredFun, target: JumpTarget) -> Stmt {
    stmt(move |env| match pred(&env) {
        Ok(true) => advance(env),
        Ok(false) => goto(env, target.get()),
        Err(err) => raise(env, err),
    })
}

pub(super) fn jump_to(target: JumpTarget) -> Stmt {
    stmt(move |env| goto(env, target.get()))
}

impl<'a> Comp<'a> {
    /// Compiles one statement into the current stream.
    pub fn stmt(&mut self, node: &Statement) -> CompileResult<()> {
        self.labeled(node, &[])
    }

    fn labeled(&mut self, node: &Statement, labels: &[String]) -> CompileResult<()> {
        match node {
            Statement::Empty(_) => Ok(()),
            Statement::Assign(assign) => self.assign(assign),
            Statement::Block(block) => self.block(block),
            Statement::Branch(branch) => self.branch(branch),
            Statement::Case(clause) => Err(CompileError::MisplacedCase {
                clause: if clause.list.is_some() { "case" } else { "default" },
                span: clause.span,
            }),
            Statement::Comm(clause) => Err(CompileError::MisplacedCase {
                clause: if clause.comm.is_some() { "case" } else { "default" },
                span: clause.span,
            }),
            Statement::Decl(decl) => self.decl(decl),
            Statement::Defer(defer) => self.defer(defer),
            Statement::Expr(expr) => self.expr_stmt(expr),
            Statement::For(node) => self.for_stmt(node, labels),
            Statement::Go(node) => self.go_stmt(node),
            Statement::If(node) => self.if_stmt(node),
            Statement::IncDec(node) => self.inc_dec(node),
            Statement::Labeled(node) => {
                let mut labels = labels.to_vec();
                labels.push(node.label.name.clone());
                self.labeled(&node.stmt, &labels)
            }
            Statement::Range(node) => self.range(node, labels),
            Statement::Return(node) => self.return_stmt(node),
            Statement::Select(node) => self.select(node, labels),
            Statement::Send(node) => self.send(node),
            Statement::Switch(node) => self.switch(node, labels),
            Statement::TypeSwitch(node) => self.type_switch(node, labels),
            Statement::Bad(span) => Err(CompileError::UnimplementedStatement {
                node: "bad statement".into(),
                kind: node.kind_name(),
                span: *span,
            }),
        }
    }

    pub fn block(&mut self, block: &Block) -> CompileResult<()> {
        self.block_opt(&block.statements, block.span)
    }

    /// Compiles `list` in a scope of its own. An empty list emits nothing.
    pub(super) fn block_opt(&mut self, list: &[Statement], span: Span) -> CompileResult<()> {
        if list.is_empty() {
            return Ok(());
        }
        let (mut inner, counts) = self.push_env_if_local_binds(list, span);
        inner.list(list)?;
        inner.pop_env_if(counts, span)
    }

    /// Compiles `list` in the current scope.
    pub fn list(&mut self, list: &[Statement]) -> CompileResult<()> {
        if list.is_empty() {
            return Err(CompileError::internal("empty statement list", Span::default()));
        }
        for node in list {
            self.stmt(node)?;
        }
        Ok(())
    }

    fn expr_stmt(&mut self, node: &Expr) -> CompileResult<()> {
        let expr = self.expr(node)?;
        if !expr.is_const() {
            self.append(expr.as_stmt(), expr.span);
        }
        Ok(())
    }

    fn if_stmt(&mut self, node: &IfStmt) -> CompileResult<()> {
        let (mut init, counts) = init_frame(self, node.init.as_deref(), node.span);
        if let Some(stmt) = &node.init {
            init.stmt(stmt)?;
        }
        match init.expr(&node.cond)?.try_as_pred()? {
            Pred::Const(flag) => {
                // the dead branch is still compiled, for its errors
                let start = init.code().len();
                init.block(&node.then_branch)?;
                if !flag {
                    init.code().truncate(start);
                }
                if let Some(else_branch) = &node.else_branch {
                    let start = init.code().len();
                    init.else_branch(else_branch)?;
                    if flag {
                        init.code().truncate(start);
                    }
                }
            }
            Pred::Fun(pred) => {
                let else_to = JumpTarget::new();
                init.append(jump_unless(pred, else_to.clone()), node.cond.span());
                init.block(&node.then_branch)?;
                match &node.else_branch {
                    Some(else_branch) => {
                        let end = JumpTarget::new();
                        init.append(jump_to(end.clone()), node.span);
                        else_to.set(init.code().len());
                        init.else_branch(else_branch)?;
                        end.set(init.code().len());
                    }
                    None => else_to.set(init.code().len()),
                }
            }
        }
        init.pop_env_if(counts, node.span)
    }

    fn else_branch(&mut self, node: &Statement) -> CompileResult<()> {
        match node {
            Statement::Block(block) => self.block(block),
            Statement::If(node) => self.if_stmt(node),
            other => self.block_opt(std::slice::from_ref(other), other.span()),
        }
    }

    fn for_stmt(&mut self, node: &ForStmt, labels: &[String]) -> CompileResult<()> {
        let (mut init, counts) = init_frame(self, node.init.as_deref(), node.span);
        if let Some(stmt) = &node.init {
            init.stmt(stmt)?;
        }
        let break_to = JumpTarget::new();
        let continue_to = JumpTarget::new();
        init.loop_info = Some(LoopInfo::new(
            break_to.clone(),
            Some(continue_to.clone()),
            labels,
        ));

        let ip_cond = init.code().len();
        let pred = match &node.cond {
            Some(cond) => init.expr(cond)?.try_as_pred()?,
            None => Pred::Const(true),
        };
        match pred {
            Pred::Const(false) => {
                init.block(&node.body)?;
                if let Some(post) = &node.post {
                    init.post_stmt(post)?;
                }
                init.code().truncate(ip_cond);
                continue_to.set(ip_cond);
            }
            pred => {
                if let Pred::Fun(pred) = pred {
                    init.append(jump_unless(pred, break_to.clone()), node.span);
                }
                init.block(&node.body)?;
                continue_to.set(init.code().len());
                if let Some(post) = &node.post {
                    init.post_stmt(post)?;
                }
                init.append(stmt(move |env| goto(env, ip_cond)), node.span);
            }
        }
        break_to.set(init.code().len());
        init.pop_env_if(counts, node.span)
    }

    fn post_stmt(&mut self, post: &Statement) -> CompileResult<()> {
        if defines(Some(post)) {
            return Err(CompileError::DeclareInPost { span: post.span() });
        }
        self.stmt(post)
    }

    fn branch(&mut self, node: &BranchStmt) -> CompileResult<()> {
        match node.kind {
            BranchKind::Break => self.jump_out_to_loop(node, true),
            BranchKind::Continue => self.jump_out_to_loop(node, false),
            BranchKind::Fallthrough => Err(CompileError::MisplacedFallthrough {
                reason: "fallthrough statement out of place",
                span: node.span,
            }),
            BranchKind::Goto => Err(CompileError::UnimplementedBranch {
                keyword: "goto",
                span: node.span,
            }),
        }
    }

    /// `break` and `continue`: finds the innermost enclosing frame with a
    /// matching target, counting the environments to leave on the way.
    fn jump_out_to_loop(&mut self, node: &BranchStmt, is_break: bool) -> CompileResult<()> {
        let keyword = if is_break { "break" } else { "continue" };
        let label = node.label.as_ref().map(|label| label.name.as_str());
        let mut upn = 0;
        let mut target = None;
        let mut frame: Option<&Comp<'_>> = Some(self);
        while let Some(comp) = frame {
            if let Some(info) = &comp.loop_info {
                let candidate = if is_break {
                    info.break_to.as_ref()
                } else {
                    info.continue_to.as_ref()
                };
                if let Some(candidate) = candidate {
                    if label.map_or(true, |label| info.has_label(label)) {
                        target = Some(candidate.clone());
                        break;
                    }
                }
            }
            if comp.func_info.is_some() {
                break;
            }
            upn += comp.up_cost();
            frame = comp.outer();
        }
        let Some(target) = target else {
            return Err(match label {
                Some(label) => CompileError::UndefinedLabel {
                    keyword,
                    label: label.to_string(),
                    span: node.span,
                },
                None => CompileError::OutsideContext {
                    keyword,
                    context: if is_break { "for/switch" } else { "for" },
                    span: node.span,
                },
            });
        };
        self.append(stmt(move |env| jump_out(env, upn, target.get())), node.span);
        Ok(())
    }

    /// Innermost function frame, with the environment hops to reach it.
    fn func_frame(&self, keyword: &'static str, span: Span) -> CompileResult<(usize, FuncInfo)> {
        let mut upn = 0;
        let mut frame: Option<&Comp<'_>> = Some(self);
        while let Some(comp) = frame {
            if let Some(info) = &comp.func_info {
                return Ok((upn, info.clone()));
            }
            upn += comp.up_cost();
            frame = comp.outer();
        }
        Err(CompileError::OutsideContext {
            keyword,
            context: "function",
            span,
        })
    }

    /// Stores the returned values into the result slots of the function
    /// environment, then interrupts the chain.
    fn return_stmt(&mut self, node: &ReturnStmt) -> CompileResult<()> {
        let (upn, info) = self.func_frame("return", node.span)?;
        let FuncInfo {
            results,
            named_results,
        } = info;
        let expected = results.len();

        if node.values.is_empty() {
            if expected > 0 && !named_results {
                return Err(CompileError::ReturnArity {
                    expected,
                    found: 0,
                    span: node.span,
                });
            }
            self.append(stmt(|env| interrupt(env, Signal::Return)), node.span);
            return Ok(());
        }

        let values = self.exprs(&node.values)?;
        let forwarded = match values.as_slice() {
            [single] if single.num_out() > 1 => Some(single.clone()),
            _ => None,
        };
        let eval: XVFun = match forwarded {
            Some(call) => {
                if call.num_out() != expected {
                    return Err(CompileError::ReturnArity {
                        expected,
                        found: call.num_out(),
                        span: node.span,
                    });
                }
                for (ty, result) in call.types().iter().zip(&results) {
                    if !ty.assignable_to(&result.ty) {
                        return Err(CompileError::incompatible(&result.ty, ty, call.span));
                    }
                }
                call.as_xv()
            }
            None => {
                if values.len() != expected {
                    return Err(CompileError::ReturnArity {
                        expected,
                        found: values.len(),
                        span: node.span,
                    });
                }
                let funs = values
                    .into_iter()
                    .zip(&results)
                    .map(|(value, result)| Ok(value.convert_to(&result.ty)?.as_x1()))
                    .collect::<CompileResult<Vec<_>>>()?;
                Arc::new(move |env| funs.iter().map(|fun| fun(env)).collect())
            }
        };
        self.append(
            stmt(move |env| match eval(&env) {
                Ok(values) => {
                    let func_env = env.up(upn).clone();
                    for (result, value) in results.iter().zip(values) {
                        result.store(&func_env, value);
                    }
                    interrupt(env, Signal::Return)
                }
                Err(err) => raise(env, err),
            }),
            node.span,
        );
        Ok(())
    }

    /// Evaluates the function and its arguments now and hands the call to the
    /// executor, which runs it when the function completes.
    fn defer(&mut self, node: &DeferStmt) -> CompileResult<()> {
        self.func_frame("defer", node.span)?;
        let call = self.prepare_call(&node.call, "defer")?;
        self.code().mark_defers();
        let spread = call.spread;
        self.append(
            stmt(move |env| match call.evaluate(&env) {
                Ok((fun, args)) => {
                    env.thread()
                        .install_defer(Box::new(move |thread| invoke(thread, fun, args, spread).map(|_| ())));
                    env.set_ip(env.ip() + 1);
                    interrupt(env, Signal::Defer)
                }
                Err(err) => raise(env, err),
            }),
            node.span,
        );
        Ok(())
    }

    /// Evaluates the call operands in a throwaway environment owned by the
    /// new goroutine, then runs the call on the task runner.
    fn go_stmt(&mut self, node: &GoStmt) -> CompileResult<()> {
        let call = self.child().prepare_call(&node.call, "go")?;
        let spread = call.spread;
        self.append(
            effect(move |env| {
                let thread = env.thread().spawn_child();
                let operands = Env::new_func(Some(env), &thread, &Program::empty(), 0, 0);
                let (fun, args) = call.evaluate(&operands)?;
                let task_thread = thread.clone();
                thread
                    .globals()
                    .tasks()
                    .spawn(move || invoke(&task_thread, fun, args, spread).map(|_| ()));
                Ok(())
            }),
            node.span,
        );
        Ok(())
    }

    fn send(&mut self, node: &SendStmt) -> CompileResult<()> {
        let chan = self.expr(&node.channel)?;
        let elem = send_elem(chan.ty()?, node.span)?;
        let value = self.expr(&node.value)?.convert_to(&elem)?.as_x1();
        let chan = chan.as_x1();
        self.append(
            effect(move |env| {
                let chan = chan(env)?;
                let value = value(env)?;
                match chan {
                    Value::Chan(chan) => chan.send(value),
                    _ => Err(RuntimeError::unsupported("send on nil channel blocks forever")),
                }
            }),
            node.span,
        );
        Ok(())
    }
}

/// Frame for the init statement of `if`, `for` and `switch`.
pub(super) fn init_frame<'c>(
    comp: &'c Comp<'_>,
    init: Option<&Statement>,
    span: Span,
) -> (Comp<'c>, Option<BindCounts>) {
    comp.push_env_if_flag(defines(init), span)
}

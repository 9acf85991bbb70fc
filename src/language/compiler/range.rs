use super::expr::recv_elem;
use super::resolve::Place;
use super::scopes::LoopInfo;
use super::*;
use crate::runtime::value::MapKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RangeKind {
    Int,
    Slice,
    String,
    Map,
    Chan,
}

/// Hidden iteration state, living in the environment of the loop.
#[derive(Clone)]
struct RangeSlots {
    subject: Bind,
    keys: Bind,
    index: Bind,
    limit: Bind,
    step: Bind,
}

impl RangeSlots {
    fn index(&self, env: &Env) -> RuntimeResult<i64> {
        self.index.load(env).as_int()
    }

    /// Evaluates the range expression once, before the first iteration.
    fn start(&self, kind: RangeKind, key_ty: &Type, value: Value, env: &Env) -> RuntimeResult<()> {
        let limit = match (kind, &value) {
            (RangeKind::Int, Value::Int(n)) => *n,
            (RangeKind::Map, Value::Map(map)) => {
                let keys: Vec<Value> = map.keys().iter().map(MapKey::to_value).collect();
                let len = keys.len() as i64;
                self.keys.store(env, SliceValue::from_vec(key_ty.clone(), keys).into());
                len
            }
            (RangeKind::Chan, _) => 0,
            (_, value) => value.len()? as i64,
        };
        self.subject.store(env, value);
        self.index.store(env, Value::Int(0));
        self.limit.store(env, Value::Int(limit));
        self.step.store(env, Value::Int(1));
        Ok(())
    }

    /// Next key and value, or `None` once the loop is done.
    fn next(&self, kind: RangeKind, env: &Env) -> RuntimeResult<Option<(Value, Value)>> {
        let mut index = self.index(env)?;
        let limit = self.limit.load(env).as_int()?;
        match kind {
            RangeKind::Int => Ok((index < limit).then(|| (Value::Int(index), Value::Nil))),
            RangeKind::Slice => match self.subject.load(env) {
                Value::Slice(slice) if index < limit => Ok(Some((Value::Int(index), slice.get(index)?))),
                _ => Ok(None),
            },
            RangeKind::String => {
                let subject = self.subject.load(env);
                let text = subject.as_str()?;
                let next = usize::try_from(index)
                    .ok()
                    .and_then(|offset| text.get(offset..))
                    .and_then(|rest| rest.chars().next());
                Ok(next.map(|ch| {
                    self.step.store(env, Value::Int(ch.len_utf8() as i64));
                    (Value::Int(index), Value::Int(i64::from(u32::from(ch))))
                }))
            }
            RangeKind::Map => {
                let (Value::Map(map), Value::Slice(keys)) = (self.subject.load(env), self.keys.load(env)) else {
                    return Ok(None);
                };
                // keys deleted since the loop started are skipped
                while index < limit {
                    let key = keys.get(index)?;
                    if let Some(value) = map.get(&key)? {
                        self.index.store(env, Value::Int(index));
                        return Ok(Some((key, value)));
                    }
                    index += 1;
                }
                self.index.store(env, Value::Int(index));
                Ok(None)
            }
            RangeKind::Chan => match self.subject.load(env) {
                Value::Chan(chan) => {
                    let (value, ok) = chan.recv();
                    Ok(ok.then_some((value, Value::Nil)))
                }
                _ => Err(RuntimeError::unsupported("range over nil channel blocks forever")),
            },
        }
    }

    fn advance(&self, env: &Env) -> RuntimeResult<()> {
        let index = self.index(env)? + self.step.load(env).as_int()?;
        self.index.store(env, Value::Int(index));
        Ok(())
    }
}

fn store_target(target: &Option<Place>, value: Value, env: &EnvRef) -> RuntimeResult<()> {
    match target {
        Some(place) => place.prepare(env)?.store(value),
        None => Ok(()),
    }
}

impl<'a> Comp<'a> {
    /// `for k, v := range x`. The loop always owns an environment: it holds
    /// the evaluated range expression and the iteration state next to the
    /// declared variables, which are shared by all iterations.
    pub(super) fn range(&mut self, node: &RangeStmt, labels: &[String]) -> CompileResult<()> {
        let (mut frame, counts) = self.push_env_if_flag(true, node.span);
        let subject = frame.expr(&node.expr)?;
        let subject_ty = subject.ty()?.clone();
        let (kind, key_ty, value_ty) = match &subject_ty {
            Type::Int => (RangeKind::Int, Type::Int, None),
            Type::Slice(elem) => (RangeKind::Slice, Type::Int, Some((**elem).clone())),
            Type::String => (RangeKind::String, Type::Int, Some(Type::Int)),
            Type::Map(key, value) => (RangeKind::Map, (**key).clone(), Some((**value).clone())),
            Type::Chan(..) => (RangeKind::Chan, recv_elem(&subject_ty, node.span)?, None),
            other => {
                return Err(CompileError::invalid(
                    format!("cannot range over expression of type {other}"),
                    node.expr.span(),
                ))
            }
        };
        let value_ty = match (&node.value, value_ty) {
            (Some(_), None) => {
                return Err(CompileError::invalid(
                    format!("range over {subject_ty} permits only one iteration variable"),
                    node.span,
                ))
            }
            (_, value_ty) => value_ty,
        };

        let key = frame.range_target(node.key.as_ref(), key_ty.clone(), node.define)?;
        let value = match (&node.value, value_ty) {
            (Some(target), Some(ty)) => frame.range_target(Some(target), ty, node.define)?,
            _ => None,
        };

        let slots = RangeSlots {
            subject: frame.declare_hidden(subject_ty.clone()),
            keys: frame.declare_hidden(Type::slice(key_ty.clone())),
            index: frame.declare_hidden(Type::Int),
            limit: frame.declare_hidden(Type::Int),
            step: frame.declare_hidden(Type::Int),
        };
        let break_to = JumpTarget::new();
        let continue_to = JumpTarget::new();
        frame.loop_info = Some(LoopInfo::new(
            break_to.clone(),
            Some(continue_to.clone()),
            labels,
        ));

        let subject = subject.as_x1();
        let state = slots.clone();
        frame.append(
            effect(move |env| state.start(kind, &key_ty, subject(env)?, env)),
            node.span,
        );

        let ip_cond = frame.code().len();
        let state = slots.clone();
        let exit = break_to.clone();
        frame.append(
            stmt(move |env| {
                let stored = state.next(kind, &env).and_then(|item| match item {
                    Some((k, v)) => {
                        store_target(&key, k, &env)?;
                        store_target(&value, v, &env)?;
                        Ok(true)
                    }
                    None => Ok(false),
                });
                match stored {
                    Ok(true) => advance(env),
                    Ok(false) => goto(env, exit.get()),
                    Err(err) => raise(env, err),
                }
            }),
            node.span,
        );

        frame.block(&node.body)?;
        if kind == RangeKind::Chan {
            continue_to.set(ip_cond);
        } else {
            continue_to.set(frame.code().len());
            let state = slots;
            frame.append(effect(move |env| state.advance(env)), node.span);
        }
        frame.append(stmt(move |env| goto(env, ip_cond)), node.span);
        break_to.set(frame.code().len());
        frame.pop_env_if(counts, node.span)
    }

    /// Iteration variable of a range loop: declared here with `:=`,
    /// otherwise any assignable place.
    fn range_target(&mut self, target: Option<&Expr>, ty: Type, define: bool) -> CompileResult<Option<Place>> {
        let Some(target) = target else {
            return Ok(None);
        };
        if define {
            let Some(ident) = target.as_identifier() else {
                return Err(CompileError::invalid(
                    "non-name on left side of :=",
                    target.span(),
                ));
            };
            let bind = self.declare_var(&ident.name, ty, ident.span)?;
            return Ok(bind.map(|bind| Place::Var { upn: 0, bind }));
        }
        let place = self.place(target)?;
        if let Some(target_ty) = place.ty() {
            if !ty.assignable_to(&target_ty) {
                return Err(CompileError::incompatible(target_ty, ty, target.span()));
            }
        }
        Ok(match place {
            Place::Blank => None,
            place => Some(place),
        })
    }
}

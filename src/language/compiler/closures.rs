use super::code::Program;
use super::scopes::FuncInfo;
use super::*;
use crate::runtime::{environment::ThreadGlobals, interpreter::exec};

/// A compiled function body. Evaluating a declaration or literal binds it to
/// the environment it appears in, producing a `FuncValue`.
pub struct FuncTemplate {
    pub name: String,
    pub ty: Arc<FuncType>,
    program: Program,
    params: Vec<Option<Bind>>,
    results: Vec<Bind>,
    binds: usize,
    int_binds: usize,
}

impl FuncTemplate {
    pub fn instantiate(self: &Arc<Self>, outer: &EnvRef) -> FuncValue {
        let template = self.clone();
        let outer = outer.clone();
        FuncValue::new(
            self.ty.clone(),
            Arc::new(move |thread: &Arc<ThreadGlobals>, args: Vec<Value>| {
                template.invoke(&outer, thread, args)
            }),
        )
    }

    fn invoke(&self, outer: &EnvRef, thread: &Arc<ThreadGlobals>, args: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        let env = Env::new_func(Some(outer), thread, &self.program, self.binds, self.int_binds);
        for (param, value) in self.params.iter().zip(args) {
            if let Some(bind) = param {
                bind.store(&env, value);
            }
        }
        for result in &self.results {
            result.store(&env, Value::zero(&result.ty));
        }
        exec(env.clone())?;
        let results = self.results.iter().map(|bind| bind.load(&env)).collect();
        thread.recycle(env);
        Ok(results)
    }
}

impl std::fmt::Debug for FuncTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncTemplate")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("instructions", &self.program.len())
            .finish()
    }
}

impl<'a> Comp<'a> {
    /// Compiles a function body in a frame of its own. Unnamed results get
    /// hidden slots so that `return` always stores into the environment.
    pub(super) fn compile_function(
        &self,
        name: &str,
        sig: &FuncTypeExpr,
        body: &Block,
        span: Span,
    ) -> CompileResult<Arc<FuncTemplate>> {
        let ty = Arc::new(self.resolve_signature(sig, span)?);
        let mut comp = self.func_child();

        let mut params = Vec::with_capacity(sig.params.len());
        for (field, param_ty) in sig.params.iter().zip(&ty.params) {
            let bind = match &field.name {
                Some(ident) => comp.declare_var(&ident.name, param_ty.clone(), ident.span)?,
                None => None,
            };
            params.push(bind);
        }

        let named_results = sig.results.iter().any(|field| field.name.is_some());
        let mut results = Vec::with_capacity(sig.results.len());
        for (field, result_ty) in sig.results.iter().zip(&ty.results) {
            let bind = match &field.name {
                Some(ident) => comp.declare_var(&ident.name, result_ty.clone(), ident.span)?,
                None => None,
            };
            results.push(bind.unwrap_or_else(|| comp.declare_hidden(result_ty.clone())));
        }
        comp.func_info = Some(FuncInfo {
            results: results.clone(),
            named_results,
        });

        if !body.statements.is_empty() {
            comp.list(&body.statements)?;
        }
        let program = comp.code().freeze();
        let (binds, int_binds) = comp.bind_counts();
        debug!(
            function = name,
            instructions = program.len(),
            binds,
            int_binds,
            defers = program.with_defers(),
            "compiled function"
        );
        Ok(Arc::new(FuncTemplate {
            name: name.to_string(),
            ty,
            program,
            params,
            results,
            binds,
            int_binds,
        }))
    }

    pub(super) fn func_lit(&self, sig: &FuncTypeExpr, body: &Block, span: Span) -> CompileResult<CompiledExpr> {
        let template = self.compile_function("func literal", sig, body, span)?;
        Ok(CompiledExpr::single(
            Type::Func(template.ty.clone()),
            Arc::new(move |env| Ok(Value::Func(template.instantiate(env)))),
            span,
        ))
    }
}

use crate::language::ast::FuncTypeExpr;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

impl ChanDir {
    pub fn can_send(self) -> bool {
        self != ChanDir::Recv
    }

    pub fn can_recv(self) -> bool {
        self != ChanDir::Send
    }
}

/// Type as written in the source.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Named(String),
    Slice(Box<TypeExpr>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Chan(ChanDir, Box<TypeExpr>),
    Func(Box<FuncTypeExpr>),
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }

    pub fn slice(elem: TypeExpr) -> Self {
        TypeExpr::Slice(Box::new(elem))
    }

    pub fn map(key: TypeExpr, value: TypeExpr) -> Self {
        TypeExpr::Map(Box::new(key), Box::new(value))
    }

    pub fn chan(elem: TypeExpr) -> Self {
        TypeExpr::Chan(ChanDir::Both, Box::new(elem))
    }
}

/// Resolved type of a value, binding or expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int,
    Float,
    String,
    Slice(Arc<Type>),
    Map(Arc<Type>, Arc<Type>),
    Chan(ChanDir, Arc<Type>),
    Func(Arc<FuncType>),
    /// The empty interface; holds a value of any dynamic type.
    Any,
    /// Type of the untyped `nil` literal.
    Nil,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub variadic: bool,
}

impl FuncType {
    pub fn new(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self {
            params,
            results,
            variadic: false,
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Element type of the trailing `...T` parameter.
    pub fn variadic_elem(&self) -> Option<&Type> {
        if !self.variadic {
            return None;
        }
        match self.params.last() {
            Some(Type::Slice(elem)) => Some(elem),
            _ => None,
        }
    }
}

impl Type {
    pub fn slice(elem: Type) -> Self {
        Type::Slice(Arc::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Arc::new(key), Arc::new(value))
    }

    pub fn chan(elem: Type) -> Self {
        Type::Chan(ChanDir::Both, Arc::new(elem))
    }

    pub fn func(params: Vec<Type>, results: Vec<Type>) -> Self {
        Type::Func(Arc::new(FuncType::new(params, results)))
    }

    /// Scalars live in the integer slots of an environment.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Bool | Type::Int | Type::Float)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub fn is_nillable(&self) -> bool {
        matches!(
            self,
            Type::Slice(_) | Type::Map(..) | Type::Chan(..) | Type::Func(_) | Type::Any
        )
    }

    /// Keys usable in maps and in `==` comparisons against interface values.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Int | Type::Float | Type::String | Type::Any | Type::Chan(..)
        )
    }

    pub fn assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (Type::Nil, target) => target.is_nillable(),
            (_, Type::Any) => true,
            (Type::Chan(ChanDir::Both, elem), Type::Chan(_, target_elem)) => elem == target_elem,
            _ => false,
        }
    }

    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::Slice(elem) | Type::Chan(_, elem) => Some(elem),
            Type::Map(_, value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float64"),
            Type::String => write!(f, "string"),
            Type::Slice(elem) => write!(f, "[]{elem}"),
            Type::Map(key, value) => write!(f, "map[{key}]{value}"),
            Type::Chan(ChanDir::Both, elem) => write!(f, "chan {elem}"),
            Type::Chan(ChanDir::Send, elem) => write!(f, "chan<- {elem}"),
            Type::Chan(ChanDir::Recv, elem) => write!(f, "<-chan {elem}"),
            Type::Func(sig) => write!(f, "{sig}"),
            Type::Any => write!(f, "any"),
            Type::Nil => write!(f, "nil"),
        }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func(")?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            match (self.variadic && idx + 1 == self.params.len(), param) {
                (true, Type::Slice(elem)) => write!(f, "...{elem}")?,
                _ => write!(f, "{param}")?,
            }
        }
        write!(f, ")")?;
        match self.results.as_slice() {
            [] => Ok(()),
            [single] => write!(f, " {single}"),
            many => {
                write!(f, " (")?;
                for (idx, result) in many.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{result}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_assigns_only_to_nillable_types() {
        assert!(Type::Nil.assignable_to(&Type::slice(Type::Int)));
        assert!(Type::Nil.assignable_to(&Type::Any));
        assert!(!Type::Nil.assignable_to(&Type::Int));
    }

    #[test]
    fn bidirectional_channel_narrows_to_directional() {
        let both = Type::chan(Type::Int);
        let send = Type::Chan(ChanDir::Send, Arc::new(Type::Int));
        assert!(both.assignable_to(&send));
        assert!(!send.assignable_to(&both));
    }

    #[test]
    fn func_type_display_marks_variadic_parameter() {
        let sig = FuncType::new(vec![Type::String, Type::slice(Type::Any)], vec![Type::Int]).variadic();
        assert_eq!(sig.to_string(), "func(string, ...any) int");
        let pair = FuncType::new(vec![], vec![Type::Int, Type::String]);
        assert_eq!(pair.to_string(), "func() (int, string)");
    }
}

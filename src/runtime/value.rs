use crate::language::{ast::BinaryOp, ast::UnaryOp, types::FuncType, types::Type};
use crate::runtime::{
    channel::ChanValue,
    environment::ThreadGlobals,
    error::{RuntimeError, RuntimeResult},
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum Value {
    /// Zero value of every nillable type.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Slice(SliceValue),
    Map(MapValue),
    Chan(ChanValue),
    Func(FuncValue),
}

impl Value {
    pub fn zero(ty: &Type) -> Value {
        match ty {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::String => Value::Str(Arc::from("")),
            _ => Value::Nil,
        }
    }

    pub fn string(text: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(text.as_ref()))
    }

    /// Type of the value stored in an interface, `Type::Nil` for a nil interface.
    pub fn dynamic_type(&self) -> Type {
        match self {
            Value::Nil => Type::Nil,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::String,
            Value::Slice(slice) => Type::slice(slice.elem.clone()),
            Value::Map(map) => Type::map(map.key.clone(), map.value.clone()),
            Value::Chan(chan) => Type::chan(chan.elem().clone()),
            Value::Func(func) => Type::Func(func.ty.clone()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float64",
            Value::Str(_) => "string",
            Value::Slice(_) => "slice",
            Value::Map(_) => "map",
            Value::Chan(_) => "chan",
            Value::Func(_) => "func",
        }
    }

    pub fn as_bool(&self) -> RuntimeResult<bool> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(expected("bool", other)),
        }
    }

    pub fn as_int(&self) -> RuntimeResult<i64> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(expected("int", other)),
        }
    }

    pub fn as_float(&self) -> RuntimeResult<f64> {
        match self {
            Value::Float(value) => Ok(*value),
            other => Err(expected("float64", other)),
        }
    }

    pub fn as_str(&self) -> RuntimeResult<&str> {
        match self {
            Value::Str(value) => Ok(value),
            other => Err(expected("string", other)),
        }
    }

    /// Raw encoding used by the integer slots of an environment.
    pub fn to_bits(&self) -> u64 {
        match self {
            Value::Bool(value) => u64::from(*value),
            Value::Int(value) => *value as u64,
            Value::Float(value) => value.to_bits(),
            _ => 0,
        }
    }

    pub fn from_bits(bits: u64, ty: &Type) -> Value {
        match ty {
            Type::Bool => Value::Bool(bits != 0),
            Type::Float => Value::Float(f64::from_bits(bits)),
            _ => Value::Int(bits as i64),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// `==` on comparable values. Slices, maps and functions compare equal
    /// only when both sides are nil.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Chan(a), Value::Chan(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn to_key(&self) -> RuntimeResult<MapKey> {
        match self {
            Value::Bool(value) => Ok(MapKey::Bool(*value)),
            Value::Int(value) => Ok(MapKey::Int(*value)),
            Value::Str(value) => Ok(MapKey::Str(value.clone())),
            other => Err(RuntimeError::unsupported(format!(
                "{} is not a valid map key",
                other.type_name()
            ))),
        }
    }

    pub fn len(&self) -> RuntimeResult<usize> {
        match self {
            Value::Nil => Ok(0),
            Value::Str(text) => Ok(text.len()),
            Value::Slice(slice) => Ok(slice.len()),
            Value::Map(map) => Ok(map.len()),
            Value::Chan(chan) => Ok(chan.len()),
            other => Err(RuntimeError::mismatch(format!(
                "invalid argument for len: {}",
                other.type_name()
            ))),
        }
    }
}

fn expected(want: &str, found: &Value) -> RuntimeError {
    RuntimeError::mismatch(format!("expected {want}, found {}", found.type_name()))
}

pub fn binary_op(op: BinaryOp, lhs: &Value, rhs: &Value) -> RuntimeResult<Value> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(lhs.equals(rhs))),
        BinaryOp::NotEq => return Ok(Value::Bool(!lhs.equals(rhs))),
        _ => {}
    }
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (Value::Float(a), Value::Float(b)) => float_op(op, *a, *b),
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Add => Ok(Value::string(format!("{a}{b}"))),
            BinaryOp::Lt => Ok(Value::Bool(a < b)),
            BinaryOp::LtEq => Ok(Value::Bool(a <= b)),
            BinaryOp::Gt => Ok(Value::Bool(a > b)),
            BinaryOp::GtEq => Ok(Value::Bool(a >= b)),
            _ => Err(invalid_operands(op, lhs, rhs)),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::And => Ok(Value::Bool(*a && *b)),
            BinaryOp::Or => Ok(Value::Bool(*a || *b)),
            _ => Err(invalid_operands(op, lhs, rhs)),
        },
        _ => Err(invalid_operands(op, lhs, rhs)),
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> RuntimeResult<Value> {
    let value = match op {
        BinaryOp::Add => Value::Int(a.wrapping_add(b)),
        BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinaryOp::Div if b == 0 => return Err(RuntimeError::DivisionByZero),
        BinaryOp::Div => Value::Int(a.wrapping_div(b)),
        BinaryOp::Rem if b == 0 => return Err(RuntimeError::DivisionByZero),
        BinaryOp::Rem => Value::Int(a.wrapping_rem(b)),
        BinaryOp::BitAnd => Value::Int(a & b),
        BinaryOp::BitOr => Value::Int(a | b),
        BinaryOp::BitXor => Value::Int(a ^ b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::LtEq => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::GtEq => Value::Bool(a >= b),
        _ => return Err(invalid_operands(op, &Value::Int(a), &Value::Int(b))),
    };
    Ok(value)
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> RuntimeResult<Value> {
    let value = match op {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Sub => Value::Float(a - b),
        BinaryOp::Mul => Value::Float(a * b),
        BinaryOp::Div => Value::Float(a / b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::LtEq => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::GtEq => Value::Bool(a >= b),
        _ => return Err(invalid_operands(op, &Value::Float(a), &Value::Float(b))),
    };
    Ok(value)
}

fn invalid_operands(op: BinaryOp, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::mismatch(format!(
        "invalid operation: {} {} {}",
        lhs.type_name(),
        op.symbol(),
        rhs.type_name()
    ))
}

pub fn unary_op(op: UnaryOp, operand: &Value) -> RuntimeResult<Value> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Int(value)) => Ok(Value::Int(value.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
        (UnaryOp::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
        (op, other) => Err(RuntimeError::mismatch(format!(
            "invalid operation {op:?} on {}",
            other.type_name()
        ))),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<nil>"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Slice(slice) => {
                write!(f, "[")?;
                for (idx, value) in slice.items.lock().iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "map[")?;
                for (idx, (key, value)) in map.entries.lock().iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                write!(f, "]")
            }
            Value::Chan(chan) => write!(f, "chan {}", chan.elem()),
            Value::Func(func) => write!(f, "{}", func.ty),
        }
    }
}

/// Slices share their backing store: element writes are visible through
/// every copy, `append` always returns a fresh backing store.
#[derive(Clone, Debug)]
pub struct SliceValue {
    pub elem: Type,
    pub items: Arc<Mutex<Vec<Value>>>,
}

impl SliceValue {
    pub fn from_vec(elem: Type, items: Vec<Value>) -> Self {
        Self {
            elem,
            items: Arc::new(Mutex::new(items)),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn get(&self, index: i64) -> RuntimeResult<Value> {
        let items = self.items.lock();
        checked_index(index, items.len()).map(|idx| items[idx].clone())
    }

    pub fn set(&self, index: i64, value: Value) -> RuntimeResult<()> {
        let mut items = self.items.lock();
        let idx = checked_index(index, items.len())?;
        items[idx] = value;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.items.lock().clone()
    }

    pub fn appended(&self, extra: impl IntoIterator<Item = Value>) -> SliceValue {
        let mut items = self.snapshot();
        items.extend(extra);
        SliceValue::from_vec(self.elem.clone(), items)
    }
}

pub fn checked_index(index: i64, len: usize) -> RuntimeResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|idx| *idx < len)
        .ok_or(RuntimeError::IndexOutOfRange { index, len })
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl MapKey {
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(value) => Value::Bool(*value),
            MapKey::Int(value) => Value::Int(*value),
            MapKey::Str(value) => Value::Str(value.clone()),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[derive(Clone, Debug)]
pub struct MapValue {
    pub key: Type,
    pub value: Type,
    pub entries: Arc<Mutex<BTreeMap<MapKey, Value>>>,
}

impl MapValue {
    pub fn new(key: Type, value: Type) -> Self {
        Self {
            key,
            value,
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn get(&self, key: &Value) -> RuntimeResult<Option<Value>> {
        let key = key.to_key()?;
        Ok(self.entries.lock().get(&key).cloned())
    }

    pub fn insert(&self, key: &Value, value: Value) -> RuntimeResult<()> {
        let key = key.to_key()?;
        self.entries.lock().insert(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &Value) -> RuntimeResult<()> {
        let key = key.to_key()?;
        self.entries.lock().remove(&key);
        Ok(())
    }

    /// Keys in ascending order, taken at the time of the call.
    pub fn keys(&self) -> Vec<MapKey> {
        self.entries.lock().keys().cloned().collect()
    }
}

pub type NativeFn =
    Arc<dyn Fn(&Arc<ThreadGlobals>, Vec<Value>) -> RuntimeResult<Vec<Value>> + Send + Sync>;

/// A callable value: a compiled closure bound to its defining environment or
/// a host function.
#[derive(Clone)]
pub struct FuncValue {
    pub ty: Arc<FuncType>,
    imp: NativeFn,
}

impl FuncValue {
    pub fn new(ty: Arc<FuncType>, imp: NativeFn) -> Self {
        Self { ty, imp }
    }

    /// Calls with one value per argument; trailing arguments of a variadic
    /// function are packed into a slice.
    pub fn call(&self, thread: &Arc<ThreadGlobals>, mut args: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        if let Some(elem) = self.ty.variadic_elem() {
            let fixed = self.ty.params.len() - 1;
            if args.len() < fixed {
                return Err(RuntimeError::ArityMismatch {
                    expected: fixed,
                    received: args.len(),
                });
            }
            let rest = args.split_off(fixed);
            args.push(SliceValue::from_vec(elem.clone(), rest).into());
        }
        self.call_slice(thread, args)
    }

    /// Calls with the variadic slice, if any, already packed.
    pub fn call_slice(&self, thread: &Arc<ThreadGlobals>, args: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        if args.len() != self.ty.params.len() {
            return Err(RuntimeError::ArityMismatch {
                expected: self.ty.params.len(),
                received: args.len(),
            });
        }
        (self.imp)(thread, args)
    }
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuncValue({})", self.ty)
    }
}

impl From<SliceValue> for Value {
    fn from(slice: SliceValue) -> Self {
        Value::Slice(slice)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_by_zero_is_reported() {
        let err = binary_op(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err, RuntimeError::DivisionByZero);
    }

    #[test]
    fn scalar_bits_preserve_floats_and_negative_ints() {
        let float = Value::Float(-2.5);
        assert_eq!(Value::from_bits(float.to_bits(), &Type::Float).as_float(), Ok(-2.5));
        let int = Value::Int(-7);
        assert_eq!(Value::from_bits(int.to_bits(), &Type::Int).as_int(), Ok(-7));
    }

    #[test]
    fn slice_copies_share_elements_but_append_detaches() {
        let slice = SliceValue::from_vec(Type::Int, vec![Value::Int(1), Value::Int(2)]);
        let alias = slice.clone();
        alias.set(0, Value::Int(9)).unwrap();
        assert_eq!(slice.get(0).unwrap().as_int(), Ok(9));
        let grown = slice.appended([Value::Int(3)]);
        grown.set(1, Value::Int(0)).unwrap();
        assert_eq!(slice.get(1).unwrap().as_int(), Ok(2));
        assert_eq!(
            slice.get(5).unwrap_err(),
            RuntimeError::IndexOutOfRange { index: 5, len: 2 }
        );
    }

    #[test]
    fn map_display_orders_keys() {
        let map = MapValue::new(Type::String, Type::Int);
        map.insert(&Value::from("b"), Value::Int(2)).unwrap();
        map.insert(&Value::from("a"), Value::Int(1)).unwrap();
        assert_eq!(Value::Map(map).to_string(), "map[a:1 b:2]");
    }
}

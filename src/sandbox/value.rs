//! Runtime values of the reward-script interpreter.
//!
//! Numbers are always `f64`. Sequences model both tuples and numeric arrays:
//! arithmetic between sequences and scalars is elementwise, the way reward
//! scripts treat observation vectors.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::EvalError;
use crate::training::env::{Info, InfoValue};

use super::parser::{BinOp, CmpOp};

/// Importable namespaces. Both are always in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Math,
    Numpy,
}

/// Native functions reachable from scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Min,
    Max,
    Float,
    Int,
    Bool,
    Round,
    Len,
    Sum,
    Pow,
    Exp,
    Log,
    Log10,
    Sqrt,
    Tanh,
    Sin,
    Cos,
    Tan,
    Floor,
    Ceil,
    Sign,
    Square,
    Clip,
    Mean,
    Minimum,
    Maximum,
    Array,
    Tuple,
    List,
}

impl Builtin {
    /// Global builtins, available without a module prefix.
    pub fn global(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "float" => Builtin::Float,
            "int" => Builtin::Int,
            "bool" => Builtin::Bool,
            "round" => Builtin::Round,
            "len" => Builtin::Len,
            "sum" => Builtin::Sum,
            "pow" => Builtin::Pow,
            "tuple" => Builtin::Tuple,
            "list" => Builtin::List,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Float => "float",
            Builtin::Int => "int",
            Builtin::Bool => "bool",
            Builtin::Round => "round",
            Builtin::Len => "len",
            Builtin::Sum => "sum",
            Builtin::Pow => "pow",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Log10 => "log10",
            Builtin::Sqrt => "sqrt",
            Builtin::Tanh => "tanh",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Sign => "sign",
            Builtin::Square => "square",
            Builtin::Clip => "clip",
            Builtin::Mean => "mean",
            Builtin::Minimum => "minimum",
            Builtin::Maximum => "maximum",
            Builtin::Array => "array",
            Builtin::Tuple => "tuple",
            Builtin::List => "list",
        }
    }
}

impl Module {
    /// Modules reachable by bare name.
    pub fn global(name: &str) -> Option<Self> {
        match name {
            "math" => Some(Module::Math),
            "np" | "numpy" => Some(Module::Numpy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Module::Math => "math",
            Module::Numpy => "numpy",
        }
    }

    /// Resolves `module.attr`.
    pub fn attribute(self, attr: &str) -> Option<Value> {
        let constant = match attr {
            "pi" => Some(std::f64::consts::PI),
            "e" => Some(std::f64::consts::E),
            "inf" => Some(f64::INFINITY),
            _ => None,
        };
        if let Some(value) = constant {
            return Some(Value::Number(value));
        }

        let shared = match attr {
            "exp" => Some(Builtin::Exp),
            "log" => Some(Builtin::Log),
            "log10" => Some(Builtin::Log10),
            "sqrt" => Some(Builtin::Sqrt),
            "tanh" => Some(Builtin::Tanh),
            "sin" => Some(Builtin::Sin),
            "cos" => Some(Builtin::Cos),
            "tan" => Some(Builtin::Tan),
            "floor" => Some(Builtin::Floor),
            "ceil" => Some(Builtin::Ceil),
            _ => None,
        };
        if let Some(builtin) = shared {
            return Some(Value::Builtin(builtin));
        }

        let builtin = match (self, attr) {
            (Module::Math, "fabs") => Builtin::Abs,
            (Module::Math, "pow") => Builtin::Pow,
            (Module::Numpy, "abs" | "absolute") => Builtin::Abs,
            (Module::Numpy, "power") => Builtin::Pow,
            (Module::Numpy, "sign") => Builtin::Sign,
            (Module::Numpy, "square") => Builtin::Square,
            (Module::Numpy, "clip") => Builtin::Clip,
            (Module::Numpy, "mean") => Builtin::Mean,
            (Module::Numpy, "sum") => Builtin::Sum,
            (Module::Numpy, "min" | "amin") => Builtin::Min,
            (Module::Numpy, "max" | "amax") => Builtin::Max,
            (Module::Numpy, "minimum") => Builtin::Minimum,
            (Module::Numpy, "maximum") => Builtin::Maximum,
            (Module::Numpy, "array" | "asarray") => Builtin::Array,
            (Module::Numpy, "round") => Builtin::Round,
            _ => return None,
        };
        Some(Value::Builtin(builtin))
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Seq(Rc<Vec<Value>>),
    Map(Rc<BTreeMap<String, Value>>),
    Module(Module),
    Builtin(Builtin),
    /// A top-level script function, by name.
    Function(Rc<str>),
    /// The bound `.get` method of a map.
    MapGet(Rc<BTreeMap<String, Value>>),
}

impl Value {
    pub fn seq(items: Vec<Value>) -> Self {
        Value::Seq(Rc::new(items))
    }

    pub fn from_observation(obs: &[f64]) -> Self {
        Value::seq(obs.iter().copied().map(Value::Number).collect())
    }

    pub fn from_info(info: &Info) -> Self {
        let map = info
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value)))
            .collect();
        Value::Map(Rc::new(map))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Number(_) => "float",
            Value::Str(_) => "str",
            Value::Seq(_) => "tuple",
            Value::Map(_) => "dict",
            Value::Module(_) => "module",
            Value::Builtin(_) => "builtin_function",
            Value::Function(_) => "function",
            Value::MapGet(_) => "method",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Module(_) | Value::Builtin(_) | Value::Function(_) | Value::MapGet(_) => true,
        }
    }

    /// Numeric view; bools count as 0 and 1.
    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(EvalError::Type(format!(
                "expected a number, got '{}'",
                other.type_name()
            ))),
        }
    }

    /// Items of an iterable value.
    pub fn items(&self) -> Result<Vec<Value>, EvalError> {
        match self {
            Value::Seq(items) => Ok(items.to_vec()),
            Value::Map(map) => Ok(map.keys().map(|k| Value::Str(Rc::from(k.as_str()))).collect()),
            Value::Str(s) => Ok(s
                .chars()
                .map(|c| Value::Str(Rc::from(c.to_string().as_str())))
                .collect()),
            other => Err(EvalError::Type(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Applies `f` to a number, or to every element of a sequence.
    pub fn map_numeric(&self, f: &dyn Fn(f64) -> f64) -> Result<Value, EvalError> {
        match self {
            Value::Seq(items) => items
                .iter()
                .map(|item| item.map_numeric(f))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::seq),
            other => Ok(Value::Number(f(other.as_number()?))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other)
    }
}

impl From<&InfoValue> for Value {
    fn from(value: &InfoValue) -> Self {
        match value {
            InfoValue::Number(n) => Value::Number(*n),
            InfoValue::Flag(b) => Value::Bool(*b),
            InfoValue::Vector(v) => Value::from_observation(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Seq(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Module(m) => write!(f, "<module '{}'>", m.name()),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Value::Function(name) => write!(f, "<function {}>", name),
            Value::MapGet(_) => write!(f, "<method get>"),
        }
    }
}

/// Evaluates `left op right`, broadcasting over sequences.
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) if op == BinOp::Add => {
            Ok(Value::Str(Rc::from(format!("{}{}", a, b).as_str())))
        }
        (Value::Seq(a), Value::Seq(b)) => {
            if a.len() != b.len() {
                return Err(EvalError::Type(format!(
                    "operands could not be broadcast together with lengths {} and {}",
                    a.len(),
                    b.len()
                )));
            }
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| binary(op, x, y))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::seq)
        }
        (Value::Seq(a), scalar) => a
            .iter()
            .map(|x| binary(op, x, scalar))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::seq),
        (scalar, Value::Seq(b)) => b
            .iter()
            .map(|y| binary(op, scalar, y))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::seq),
        _ => {
            let a = left.as_number()?;
            let b = right.as_number()?;
            arithmetic(op, a, b).map(Value::Number)
        }
    }
}

/// Scalar arithmetic with floor-division and modulo rounding toward negative
/// infinity.
pub fn arithmetic(op: BinOp, a: f64, b: f64) -> Result<f64, EvalError> {
    match op {
        BinOp::Add => Ok(a + b),
        BinOp::Sub => Ok(a - b),
        BinOp::Mul => Ok(a * b),
        BinOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(a / b)
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok((a / b).floor())
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                Ok(r + b)
            } else {
                Ok(r)
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(a.powf(b))
        }
    }
}

/// Structural equality. Numbers and bools compare numerically.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Number(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => {
            left.as_number().ok() == right.as_number().ok()
        }
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Seq(a), Value::Seq(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        (Value::Module(a), Value::Module(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::Function(a), Value::Function(b)) => a == b,
        _ => false,
    }
}

/// Evaluates one link of a (possibly chained) comparison.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    match op {
        CmpOp::Eq => Ok(values_equal(left, right)),
        CmpOp::NotEq => Ok(!values_equal(left, right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Is => Ok(identical(left, right)),
        CmpOp::IsNot => Ok(!identical(left, right)),
        CmpOp::Lt => ordering(left, right).map(|o| o.is_some_and(Ordering::is_lt)),
        CmpOp::LtEq => ordering(left, right).map(|o| o.is_some_and(Ordering::is_le)),
        CmpOp::Gt => ordering(left, right).map(|o| o.is_some_and(Ordering::is_gt)),
        CmpOp::GtEq => ordering(left, right).map(|o| o.is_some_and(Ordering::is_ge)),
    }
}

/// Orders two values; `None` when unordered (NaN involved).
fn ordering(left: &Value, right: &Value) -> Result<Option<Ordering>, EvalError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Seq(a), Value::Seq(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                if !values_equal(x, y) {
                    return ordering(x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match (left.as_number(), right.as_number()) {
            (Ok(a), Ok(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(EvalError::Type(format!(
                "ordering not supported between '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(&**needle)),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(&**key)),
        (Value::Map(_), _) => Ok(false),
        (Value::Seq(items), _) => Ok(items.iter().any(|x| values_equal(x, item))),
        _ => Err(EvalError::Type(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

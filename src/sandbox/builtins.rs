//! Native functions callable from reward scripts.

use crate::error::EvalError;

use super::parser::{BinOp, CmpOp};
use super::value::{binary, compare, Builtin, Value};

/// Calls a builtin with already-evaluated arguments.
pub fn call(builtin: Builtin, args: Vec<Value>) -> Result<Value, EvalError> {
    match builtin {
        Builtin::Abs => {
            let [x] = exact(builtin, args)?;
            x.map_numeric(&f64::abs)
        }
        Builtin::Min => extreme(builtin, args, CmpOp::Lt),
        Builtin::Max => extreme(builtin, args, CmpOp::Gt),
        Builtin::Float => {
            let [x] = exact(builtin, args)?;
            to_float(&x).map(Value::Number)
        }
        Builtin::Int => {
            let [x] = exact(builtin, args)?;
            let n = to_float(&x)?;
            if !n.is_finite() {
                return Err(EvalError::Type(format!(
                    "cannot convert {} to integer",
                    n
                )));
            }
            Ok(Value::Number(n.trunc()))
        }
        Builtin::Bool => {
            let [x] = exact(builtin, args)?;
            Ok(Value::Bool(x.truthy()))
        }
        Builtin::Round => round(builtin, args),
        Builtin::Len => {
            let [x] = exact(builtin, args)?;
            match &x {
                Value::Seq(items) => Ok(Value::Number(items.len() as f64)),
                Value::Map(map) => Ok(Value::Number(map.len() as f64)),
                Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
                other => Err(EvalError::Type(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            }
        }
        Builtin::Sum => {
            check_count(builtin, &args, 1, 2)?;
            let start = match args.get(1) {
                Some(v) => v.as_number()?,
                None => 0.0,
            };
            let total = args[0]
                .items()?
                .iter()
                .try_fold(start, |acc, item| item.as_number().map(|x| acc + x))?;
            Ok(Value::Number(total))
        }
        Builtin::Pow => {
            let [base, exponent] = exact(builtin, args)?;
            binary(BinOp::Pow, &base, &exponent)
        }
        Builtin::Exp => unary(builtin, args, f64::exp),
        Builtin::Log => {
            check_count(builtin, &args, 1, 2)?;
            if let Some(base) = args.get(1) {
                let base = base.as_number()?;
                return args[0].map_numeric(&|x| x.ln() / base.ln());
            }
            unary(builtin, args, f64::ln)
        }
        Builtin::Log10 => unary(builtin, args, f64::log10),
        Builtin::Sqrt => unary(builtin, args, f64::sqrt),
        Builtin::Tanh => unary(builtin, args, f64::tanh),
        Builtin::Sin => unary(builtin, args, f64::sin),
        Builtin::Cos => unary(builtin, args, f64::cos),
        Builtin::Tan => unary(builtin, args, f64::tan),
        Builtin::Floor => unary(builtin, args, f64::floor),
        Builtin::Ceil => unary(builtin, args, f64::ceil),
        Builtin::Sign => unary(builtin, args, sign),
        Builtin::Square => unary(builtin, args, |x| x * x),
        Builtin::Clip => {
            let [x, low, high] = exact(builtin, args)?;
            let low = low.as_number()?;
            let high = high.as_number()?;
            x.map_numeric(&|v| v.max(low).min(high))
        }
        Builtin::Mean => {
            let [x] = exact(builtin, args)?;
            match &x {
                Value::Seq(items) => {
                    // Empty input yields NaN, which the caller rejects as non-finite.
                    let total = items
                        .iter()
                        .try_fold(0.0, |acc, item| item.as_number().map(|v| acc + v))?;
                    Ok(Value::Number(total / items.len() as f64))
                }
                other => Ok(Value::Number(other.as_number()?)),
            }
        }
        Builtin::Minimum => pairwise(builtin, args, f64::min),
        Builtin::Maximum => pairwise(builtin, args, f64::max),
        Builtin::Array => {
            let [x] = exact(builtin, args)?;
            match x {
                Value::Seq(_) | Value::Number(_) | Value::Bool(_) => Ok(x),
                other => Err(EvalError::Type(format!(
                    "cannot build an array from '{}'",
                    other.type_name()
                ))),
            }
        }
        // Sequences are immutable, so both conversions just copy elements.
        Builtin::Tuple | Builtin::List => {
            check_count(builtin, &args, 0, 1)?;
            match args.first() {
                Some(Value::Seq(items)) => Ok(Value::Seq(items.clone())),
                Some(other) => other.items().map(Value::seq),
                None => Ok(Value::seq(Vec::new())),
            }
        }
    }
}

fn check_count(
    builtin: Builtin,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::WrongArgumentCount {
            name: builtin.name().to_string(),
            expected: if args.len() < min { min } else { max },
            found: args.len(),
        });
    }
    Ok(())
}

/// Destructures exactly `N` arguments.
fn exact<const N: usize>(builtin: Builtin, args: Vec<Value>) -> Result<[Value; N], EvalError> {
    let found = args.len();
    args.try_into().map_err(|_| EvalError::WrongArgumentCount {
        name: builtin.name().to_string(),
        expected: N,
        found,
    })
}

fn unary(builtin: Builtin, args: Vec<Value>, f: fn(f64) -> f64) -> Result<Value, EvalError> {
    let [x] = exact(builtin, args)?;
    x.map_numeric(&f)
}

fn pairwise(builtin: Builtin, args: Vec<Value>, f: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let [a, b] = exact(builtin, args)?;
    match (&a, &b) {
        (Value::Seq(_), _) | (_, Value::Seq(_)) => {
            let a_items = broadcast(&a, &b)?;
            let b_items = broadcast(&b, &a)?;
            a_items
                .iter()
                .zip(b_items.iter())
                .map(|(x, y)| -> Result<Value, EvalError> {
                    Ok(Value::Number(f(x.as_number()?, y.as_number()?)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::seq)
        }
        _ => Ok(Value::Number(f(a.as_number()?, b.as_number()?))),
    }
}

/// Expands `value` to the length of `other` when one side is scalar.
fn broadcast(value: &Value, other: &Value) -> Result<Vec<Value>, EvalError> {
    match (value, other) {
        (Value::Seq(items), Value::Seq(others)) if items.len() != others.len() => {
            Err(EvalError::Type(format!(
                "operands could not be broadcast together with lengths {} and {}",
                items.len(),
                others.len()
            )))
        }
        (Value::Seq(items), _) => Ok(items.to_vec()),
        (scalar, Value::Seq(others)) => Ok(vec![scalar.clone(); others.len()]),
        (scalar, _) => Ok(vec![scalar.clone()]),
    }
}

/// `min`/`max` over either one iterable argument or several scalars.
fn extreme(builtin: Builtin, args: Vec<Value>, better: CmpOp) -> Result<Value, EvalError> {
    let candidates = match args.len() {
        0 => {
            return Err(EvalError::WrongArgumentCount {
                name: builtin.name().to_string(),
                expected: 1,
                found: 0,
            })
        }
        1 => args[0].items()?,
        _ => args,
    };

    let mut iter = candidates.into_iter();
    let mut best = iter.next().ok_or_else(|| {
        EvalError::Type(format!("{}() arg is an empty sequence", builtin.name()))
    })?;
    for candidate in iter {
        if compare(better, &candidate, &best)? {
            best = candidate;
        }
    }
    Ok(best)
}

fn round(builtin: Builtin, args: Vec<Value>) -> Result<Value, EvalError> {
    check_count(builtin, &args, 1, 2)?;
    let digits = match args.get(1) {
        Some(Value::None) | None => None,
        Some(v) => Some(v.as_number()?),
    };
    match digits {
        None => args[0].map_numeric(&f64::round_ties_even),
        Some(d) => {
            let scale = 10f64.powi(d as i32);
            args[0].map_numeric(&|x| (x * scale).round_ties_even() / scale)
        }
    }
}

fn to_float(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            EvalError::Type(format!("could not convert string to float: '{}'", s))
        }),
        other => other.as_number(),
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        // Zero and NaN pass through.
        x
    }
}

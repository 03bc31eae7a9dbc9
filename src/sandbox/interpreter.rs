//! Tree-walking evaluator for parsed reward scripts.
//!
//! Every call gets a fresh local scope; nothing survives between top-level
//! invocations. Scripts have no loops, so recursion depth is the only
//! unbounded resource and is capped at [`MAX_CALL_DEPTH`].

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::EvalError;

use super::builtins;
use super::parser::{BoolOp, Expr, FunctionDef, Program, Stmt, Target, UnaryOp};
use super::value::{binary, compare, Builtin, Module, Value};

/// Nested script-function calls allowed before evaluation is aborted.
pub const MAX_CALL_DEPTH: usize = 32;

/// Deepest expression tree (and block nesting) the parser accepts, so that
/// evaluating a single expression stays within a bounded stack.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

type Scope = HashMap<String, Value>;

enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<'p> {
    program: &'p Program,
    depth: usize,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self { program, depth: 0 }
    }

    /// Calls a top-level function.
    ///
    /// Returns `Ok(None)` when the body finishes without reaching a `return`.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
        let program = self.program;
        let func = program
            .function(name)
            .ok_or_else(|| EvalError::UndefinedName(name.to_string()))?;
        self.call_function(func, args)
    }

    fn call_function(
        &mut self,
        func: &'p FunctionDef,
        args: Vec<Value>,
    ) -> Result<Option<Value>, EvalError> {
        if args.len() != func.params.len() {
            return Err(EvalError::WrongArgumentCount {
                name: func.name.clone(),
                expected: func.params.len(),
                found: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepth(MAX_CALL_DEPTH));
        }

        let mut scope: Scope = func.params.iter().cloned().zip(args).collect();
        self.depth += 1;
        let flow = self.exec_block(&func.body, &mut scope);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(Some(value)),
            Flow::Normal => Ok(None),
        }
    }

    fn exec_block(&mut self, block: &'p [Stmt], scope: &mut Scope) -> Result<Flow, EvalError> {
        for stmt in block {
            if let Flow::Return(value) = self.exec(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &'p Stmt, scope: &mut Scope) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                let value = self.eval(value, scope)?;
                assign(target, value, scope)?;
            }
            Stmt::AugAssign {
                name, op, value, ..
            } => {
                let current = scope
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::UndefinedName(name.clone()))?;
                let rhs = self.eval(value, scope)?;
                scope.insert(name.clone(), binary(*op, &current, &rhs)?);
            }
            Stmt::If {
                branches, orelse, ..
            } => {
                for (condition, body) in branches {
                    if self.eval(condition, scope)?.truthy() {
                        return self.exec_block(body, scope);
                    }
                }
                return self.exec_block(orelse, scope);
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Pass => {}
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &'p Expr, scope: &mut Scope) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(Rc::from(s.as_str()))),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self.lookup(name, scope),
            Expr::Tuple(items) | Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::seq),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => value.map_numeric(&|x| -x),
                    UnaryOp::Pos => value.map_numeric(&|x| x),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    BoolOp::And => !left.truthy(),
                    BoolOp::Or => left.truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first, scope)?;
                for (op, operand) in rest {
                    let right = self.eval(operand, scope)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Conditional {
                condition,
                then,
                orelse,
            } => {
                if self.eval(condition, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            Expr::Call { func, args } => {
                let callee = self.eval(func, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_value(callee, args)
            }
            Expr::Attribute { value, attr } => {
                let value = self.eval(value, scope)?;
                attribute(value, attr)
            }
            Expr::Subscript { value, index } => {
                let value = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                subscript(&value, &index)
            }
            Expr::Slice {
                value,
                lower,
                upper,
            } => {
                let value = self.eval(value, scope)?;
                let lower = match lower {
                    Some(expr) => Some(self.eval(expr, scope)?),
                    None => None,
                };
                let upper = match upper {
                    Some(expr) => Some(self.eval(expr, scope)?),
                    None => None,
                };
                slice(&value, lower.as_ref(), upper.as_ref())
            }
        }
    }

    /// Resolves a name: locals, then script functions, then builtins and modules.
    fn lookup(&self, name: &str, scope: &Scope) -> Result<Value, EvalError> {
        if let Some(value) = scope.get(name) {
            return Ok(value.clone());
        }
        if self.program.function(name).is_some() {
            return Ok(Value::Function(Rc::from(name)));
        }
        if let Some(builtin) = Builtin::global(name) {
            return Ok(Value::Builtin(builtin));
        }
        Module::global(name)
            .map(Value::Module)
            .ok_or_else(|| EvalError::UndefinedName(name.to_string()))
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match callee {
            Value::Function(name) => {
                let program = self.program;
                let func = program
                    .function(&name)
                    .ok_or_else(|| EvalError::UndefinedName(name.to_string()))?;
                Ok(self.call_function(func, args)?.unwrap_or(Value::None))
            }
            Value::Builtin(builtin) => builtins::call(builtin, args),
            Value::MapGet(map) => {
                if args.is_empty() || args.len() > 2 {
                    return Err(EvalError::WrongArgumentCount {
                        name: "get".to_string(),
                        expected: if args.is_empty() { 1 } else { 2 },
                        found: args.len(),
                    });
                }
                let mut args = args.into_iter();
                let key = args.next();
                let default = args.next().unwrap_or(Value::None);
                let found = match key {
                    Some(Value::Str(key)) => map.get(&*key).cloned(),
                    _ => None,
                };
                Ok(found.unwrap_or(default))
            }
            other => Err(EvalError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

fn assign(target: &Target, value: Value, scope: &mut Scope) -> Result<(), EvalError> {
    match target {
        Target::Name(name) => {
            scope.insert(name.clone(), value);
            Ok(())
        }
        Target::Tuple(targets) => {
            let items = value.items()?;
            if items.len() != targets.len() {
                return Err(EvalError::Type(format!(
                    "cannot unpack {} values into {} names",
                    items.len(),
                    targets.len()
                )));
            }
            for (target, item) in targets.iter().zip(items) {
                assign(target, item, scope)?;
            }
            Ok(())
        }
    }
}

fn attribute(value: Value, attr: &str) -> Result<Value, EvalError> {
    match value {
        Value::Module(module) => module.attribute(attr).ok_or_else(|| {
            EvalError::Type(format!(
                "module '{}' has no attribute '{}'",
                module.name(),
                attr
            ))
        }),
        Value::Map(map) if attr == "get" => Ok(Value::MapGet(map)),
        other => Err(EvalError::Type(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            attr
        ))),
    }
}

/// Converts a script number into a position, counting negatives from the end.
fn resolve_index(index: &Value, len: usize) -> Result<usize, EvalError> {
    let raw = index.as_number()?;
    if raw.fract() != 0.0 || !raw.is_finite() {
        return Err(EvalError::Type(format!(
            "indices must be integers, got {}",
            raw
        )));
    }
    let raw = raw as i64;
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved >= len as i64 {
        return Err(EvalError::IndexOutOfRange { index: raw, len });
    }
    Ok(resolved as usize)
}

fn subscript(value: &Value, index: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Seq(items) => Ok(items[resolve_index(index, items.len())?].clone()),
        Value::Map(map) => {
            let key = match index {
                Value::Str(key) => key.to_string(),
                other => other.to_string(),
            };
            map.get(&key)
                .cloned()
                .ok_or_else(|| EvalError::KeyNotFound(format!("'{}'", key)))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let c = chars[resolve_index(index, chars.len())?];
            Ok(Value::Str(Rc::from(c.to_string().as_str())))
        }
        other => Err(EvalError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `value[lower:upper]` with out-of-range bounds clamped.
fn slice(value: &Value, lower: Option<&Value>, upper: Option<&Value>) -> Result<Value, EvalError> {
    let Value::Seq(items) = value else {
        return Err(EvalError::Type(format!(
            "'{}' object cannot be sliced",
            value.type_name()
        )));
    };

    let len = items.len() as i64;
    let bound = |v: Option<&Value>, default: i64| -> Result<usize, EvalError> {
        let raw = match v {
            None | Some(Value::None) => default,
            Some(v) => {
                let n = v.as_number()?;
                if n.fract() != 0.0 {
                    return Err(EvalError::Type(format!(
                        "slice indices must be integers, got {}",
                        n
                    )));
                }
                n as i64
            }
        };
        let resolved = if raw < 0 { raw + len } else { raw };
        Ok(resolved.clamp(0, len) as usize)
    };

    let start = bound(lower, 0)?;
    let end = bound(upper, len)?;
    if start >= end {
        return Ok(Value::seq(Vec::new()));
    }
    Ok(Value::seq(items[start..end].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::parser::parse;

    fn run(source: &str, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
        let program = parse(source).expect("script should parse");
        Interpreter::new(&program).call("f", args)
    }

    fn run_num(source: &str, args: Vec<Value>) -> f64 {
        run(source, args)
            .expect("script should evaluate")
            .expect("script should return")
            .as_number()
            .expect("result should be numeric")
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(run_num("def f():\n    return 1 + 2 * 3 ** 2\n", vec![]), 19.0);
        assert_eq!(run_num("def f():\n    return -2 ** 2\n", vec![]), -4.0);
        assert_eq!(run_num("def f():\n    return 2 ** -1\n", vec![]), 0.5);
        assert_eq!(run_num("def f():\n    return -7 // 2\n", vec![]), -4.0);
    }

    #[test]
    fn test_chained_comparison_short_circuits() {
        let source = "def f(t):\n    if 50 <= t <= 60: return 1.0\n    return -1.0\n";
        assert_eq!(run_num(source, vec![Value::Number(55.0)]), 1.0);
        assert_eq!(run_num(source, vec![Value::Number(61.0)]), -1.0);
        assert_eq!(run_num(source, vec![Value::Number(49.0)]), -1.0);
    }

    #[test]
    fn test_tuple_unpacking() {
        let source = "def f(obs):\n    a, b = obs\n    return a - b\n";
        assert_eq!(
            run_num(source, vec![Value::from_observation(&[5.0, 2.0])]),
            3.0
        );
        assert!(matches!(
            run(source, vec![Value::from_observation(&[1.0])]),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_augmented_assignment() {
        let source = "def f(x):\n    r = 1\n    r += x\n    r *= 2\n    r -= 1\n    r /= 3\n    return r\n";
        assert_eq!(run_num(source, vec![Value::Number(4.0)]), 3.0);
    }

    #[test]
    fn test_augmented_assignment_needs_binding() {
        let source = "def f():\n    r += 1\n    return r\n";
        assert_eq!(
            run(source, vec![]),
            Err(EvalError::UndefinedName("r".to_string()))
        );
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(run_num("def f():\n    return 0 or 5\n", vec![]), 5.0);
        assert_eq!(run_num("def f():\n    return 3 and 4\n", vec![]), 4.0);
        // Right side never evaluated.
        assert_eq!(run_num("def f():\n    return 0 and 1 / 0\n", vec![]), 0.0);
    }

    #[test]
    fn test_conditional_expression() {
        let source = "def f(done):\n    return 10.0 if done else -0.1\n";
        assert_eq!(run_num(source, vec![Value::Bool(true)]), 10.0);
        assert_eq!(run_num(source, vec![Value::Bool(false)]), -0.1);
    }

    #[test]
    fn test_negative_index_and_slice() {
        let obs = Value::from_observation(&[1.0, 2.0, 3.0]);
        assert_eq!(
            run_num("def f(obs):\n    return obs[-1]\n", vec![obs.clone()]),
            3.0
        );
        assert_eq!(
            run_num("def f(obs):\n    return sum(obs[:2])\n", vec![obs.clone()]),
            3.0
        );
        assert_eq!(
            run_num("def f(obs):\n    return len(obs[5:])\n", vec![obs.clone()]),
            0.0
        );
        assert_eq!(
            run("def f(obs):\n    return obs[3]\n", vec![obs]),
            Err(EvalError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_helper_functions() {
        let source = "def penalty(x):\n    return x * x\n\ndef f(x):\n    return -penalty(x - 1)\n";
        assert_eq!(run_num(source, vec![Value::Number(3.0)]), -4.0);
    }

    #[test]
    fn test_recursion_is_capped() {
        let source = "def g(x):\n    return g(x)\n\ndef f():\n    return g(1)\n";
        assert_eq!(run(source, vec![]), Err(EvalError::CallDepth(MAX_CALL_DEPTH)));
    }

    #[test]
    fn test_missing_return_reported_as_none() {
        let source = "def f(x):\n    if x:\n        return 1\n";
        assert!(run(source, vec![Value::Bool(false)]).unwrap().is_none());
    }

    #[test]
    fn test_modules_and_constants() {
        assert!(
            (run_num("def f():\n    return math.exp(0) + np.pi\n", vec![])
                - (1.0 + std::f64::consts::PI))
                .abs()
                < 1e-12
        );
        assert_eq!(
            run_num("def f():\n    return np.clip(5, 0, 1)\n", vec![]),
            1.0
        );
        assert!(matches!(
            run("def f():\n    return math.nope(1)\n", vec![]),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_undefined_name() {
        assert_eq!(
            run("def f():\n    return missing\n", vec![]),
            Err(EvalError::UndefinedName("missing".to_string()))
        );
    }

    #[test]
    fn test_calling_non_callable() {
        assert!(matches!(
            run("def f():\n    x = 1\n    return x(2)\n", vec![]),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_wrong_helper_arity() {
        let source = "def g(a, b):\n    return a\n\ndef f():\n    return g(1)\n";
        assert!(matches!(
            run(source, vec![]),
            Err(EvalError::WrongArgumentCount { expected: 2, found: 1, .. })
        ));
    }
}

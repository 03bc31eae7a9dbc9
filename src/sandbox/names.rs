//! Load-time name resolution.
//!
//! A script that refers to a name no scope can ever provide (`isinstance`,
//! `np.linalg`) would fault on every step. Such scripts are rejected when
//! they are compiled instead.

use std::collections::HashSet;

use crate::error::SandboxError;

use super::parser::{Expr, FunctionDef, Program, Stmt, Target};
use super::value::{Builtin, Module};

/// Checks every name and module attribute used by `program`.
///
/// A local counts as resolvable if the function assigns it anywhere; whether
/// the assignment runs before the use is still a runtime question.
pub fn check_names(program: &Program) -> Result<(), SandboxError> {
    for func in &program.functions {
        let mut locals: HashSet<&str> = func.params.iter().map(String::as_str).collect();
        collect_assigned(&func.body, &mut locals);

        let resolver = Resolver {
            program,
            func,
            locals,
        };
        resolver.block(&func.body)?;
    }
    Ok(())
}

fn collect_assigned<'a>(block: &'a [Stmt], locals: &mut HashSet<&'a str>) {
    for stmt in block {
        match stmt {
            Stmt::Assign { target, .. } => collect_target(target, locals),
            Stmt::AugAssign { name, .. } => {
                locals.insert(name.as_str());
            }
            Stmt::If {
                branches, orelse, ..
            } => {
                for (_, body) in branches {
                    collect_assigned(body, locals);
                }
                collect_assigned(orelse, locals);
            }
            Stmt::Return { .. } | Stmt::Pass | Stmt::Expr(_) => {}
        }
    }
}

fn collect_target<'a>(target: &'a Target, locals: &mut HashSet<&'a str>) {
    match target {
        Target::Name(name) => {
            locals.insert(name.as_str());
        }
        Target::Tuple(items) => items.iter().for_each(|t| collect_target(t, locals)),
    }
}

struct Resolver<'a> {
    program: &'a Program,
    func: &'a FunctionDef,
    locals: HashSet<&'a str>,
}

impl Resolver<'_> {
    fn block(&self, block: &[Stmt]) -> Result<(), SandboxError> {
        for stmt in block {
            match stmt {
                Stmt::Assign { value, .. } | Stmt::AugAssign { value, .. } => self.expr(value)?,
                Stmt::If {
                    branches, orelse, ..
                } => {
                    for (condition, body) in branches {
                        self.expr(condition)?;
                        self.block(body)?;
                    }
                    self.block(orelse)?;
                }
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        self.expr(value)?;
                    }
                }
                Stmt::Expr(expr) => self.expr(expr)?,
                Stmt::Pass => {}
            }
        }
        Ok(())
    }

    fn expr(&self, expr: &Expr) -> Result<(), SandboxError> {
        match expr {
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None => Ok(()),
            Expr::Name(name) => {
                if self.resolves(name) {
                    Ok(())
                } else {
                    Err(self.unresolved(name.clone()))
                }
            }
            Expr::Tuple(items) | Expr::List(items) => self.all(items),
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::Compare { first, rest } => {
                self.expr(first)?;
                rest.iter().try_for_each(|(_, e)| self.expr(e))
            }
            Expr::Conditional {
                condition,
                then,
                orelse,
            } => {
                self.expr(condition)?;
                self.expr(then)?;
                self.expr(orelse)
            }
            Expr::Call { func, args } => {
                self.expr(func)?;
                self.all(args)
            }
            Expr::Attribute { value, attr } => {
                if let Expr::Name(name) = value.as_ref() {
                    if let Some(module) = self.module(name) {
                        if module.attribute(attr).is_none() {
                            return Err(self.unresolved(format!("{}.{}", name, attr)));
                        }
                        return Ok(());
                    }
                }
                self.expr(value)
            }
            Expr::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)
            }
            Expr::Slice {
                value,
                lower,
                upper,
            } => {
                self.expr(value)?;
                lower
                    .iter()
                    .chain(upper.iter())
                    .try_for_each(|e| self.expr(e))
            }
        }
    }

    fn all(&self, items: &[Expr]) -> Result<(), SandboxError> {
        items.iter().try_for_each(|e| self.expr(e))
    }

    /// Mirrors the interpreter's lookup order: locals, script functions,
    /// builtins, then modules.
    fn resolves(&self, name: &str) -> bool {
        self.locals.contains(name)
            || self.program.function(name).is_some()
            || Builtin::global(name).is_some()
            || Module::global(name).is_some()
    }

    /// The module a bare name refers to, unless something earlier in the
    /// lookup order shadows it.
    fn module(&self, name: &str) -> Option<Module> {
        if self.locals.contains(name)
            || self.program.function(name).is_some()
            || Builtin::global(name).is_some()
        {
            return None;
        }
        Module::global(name)
    }

    fn unresolved(&self, name: String) -> SandboxError {
        SandboxError::UnresolvedName {
            name,
            function: self.func.name.clone(),
            line: self.func.line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::parser::parse;

    fn check(source: &str) -> Result<(), SandboxError> {
        check_names(&parse(source).unwrap())
    }

    #[test]
    fn test_known_names_resolve() {
        check(
            "import numpy as np\n\
             def helper(x):\n    return x * 2\n\
             def compute_reward(obs, terminated, truncated, info):\n    \
             a, b = obs[0], obs[1]\n    \
             if terminated:\n        bonus = 1\n    \
             total = helper(a) + math.sqrt(abs(b)) + np.clip(bonus, 0, 1)\n    \
             total += tuple(obs)[0]\n    \
             return info.get('x', total)\n",
        )
        .unwrap();
    }

    #[test]
    fn test_unknown_global_is_rejected() {
        let err = check(
            "def compute_reward(obs, terminated, truncated, info):\n    \
             return 1.0 if isinstance(obs, list) else 0.0\n",
        )
        .unwrap_err();
        assert_eq!(
            err,
            SandboxError::UnresolvedName {
                name: "isinstance".to_string(),
                function: "compute_reward".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn test_unknown_module_attribute_is_rejected() {
        let err = check(
            "def compute_reward(obs, terminated, truncated, info):\n    \
             return -np.linalg.norm(obs)\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SandboxError::UnresolvedName { ref name, .. } if name == "np.linalg"
        ));
    }

    #[test]
    fn test_helper_names_are_checked_too() {
        let err = check(
            "def helper(x):\n    return scale * x\n\
             def compute_reward(obs, terminated, truncated, info):\n    return helper(obs[0])\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SandboxError::UnresolvedName { ref function, .. } if function == "helper"
        ));
    }

    #[test]
    fn test_shadowed_module_is_an_ordinary_local() {
        check(
            "def compute_reward(obs, terminated, truncated, info):\n    \
             np = info\n    \
             return np.get('x', 0)\n",
        )
        .unwrap();
    }
}

//! Expression Evaluation
//!
//! Tree-walking evaluator over the expression AST, plus the builtin
//! function table and the prelude runner.

use std::path::Path;

use super::lexer::tokenize;
use super::parser::parse;
use super::types::{num_to_string, BinaryOp, Env, EvalError, Expr, UnaryOp, Value};
use super::Evaluator;

/// The concrete expression evaluator. Stateless; all state lives in the
/// environment handed to each call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEvaluator;

impl ExprEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expr: &str, env: &Env) -> Result<Value, EvalError> {
        let tokens = tokenize(expr)?;
        let ast = parse(tokens)?;
        eval_expr(&ast, env)
    }

    fn run_prelude(&self, code: &str, env: &mut Env) -> Result<(), EvalError> {
        for (lineno, raw_line) in code.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, expr_text) = split_assignment(line).ok_or_else(|| {
                EvalError::Syntax(format!(
                    "prelude line {}: expected 'name = expression'",
                    lineno + 1
                ))
            })?;
            let value = self
                .evaluate(expr_text, env)
                .map_err(|e| prefix_error(e, lineno + 1))?;
            env.set(name, value);
        }
        Ok(())
    }
}

/// Split a prelude statement into (name, expression text). The `=` must
/// not open a `==` comparison.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let eq = line.find('=')?;
    if line.as_bytes().get(eq + 1) == Some(&b'=') {
        return None;
    }
    let name = line[..eq].trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if !valid {
        return None;
    }
    Some((name, line[eq + 1..].trim()))
}

fn prefix_error(err: EvalError, lineno: usize) -> EvalError {
    match err {
        EvalError::Syntax(m) => EvalError::Syntax(format!("prelude line {}: {}", lineno, m)),
        EvalError::Name(n) => EvalError::Name(n),
        EvalError::Value(m) => EvalError::Value(format!("prelude line {}: {}", lineno, m)),
    }
}

// ─── Evaluation ──────────────────────────────────────────────

pub fn eval_expr(expr: &Expr, env: &Env) -> Result<Value, EvalError> {
    match expr {
        Expr::Num(n) => Ok(Value::Num(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),

        Expr::Var(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Name(name.clone())),

        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, env)?;
            match op {
                UnaryOp::Neg => Ok(Value::Num(-as_number(&value)?)),
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            }
        }

        Expr::Binary { op, left, right } => eval_binary(*op, left, right, env),

        Expr::Ternary { cond, then, els } => {
            if eval_expr(cond, env)?.is_truthy() {
                eval_expr(then, env)
            } else {
                eval_expr(els, env)
            }
        }

        Expr::Index { base, index } => {
            let base = eval_expr(base, env)?;
            let raw = as_number(&eval_expr(index, env)?)? as i64;
            match base {
                Value::List(items) => {
                    let i = resolve_index(raw, items.len())?;
                    Ok(items[i].clone())
                }
                Value::Str(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let i = resolve_index(raw, chars.len())?;
                    Ok(Value::Str(chars[i].to_string()))
                }
                other => Err(EvalError::Value(format!(
                    "cannot index a {}",
                    other.kind()
                ))),
            }
        }

        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, env)?);
            }
            call_builtin(name, &values)
        }

        Expr::Tuple(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, env)?);
            }
            Ok(Value::List(values))
        }
    }
}

/// Negative indices count from the end, Python style.
fn resolve_index(raw: i64, len: usize) -> Result<usize, EvalError> {
    let adjusted = if raw < 0 { raw + len as i64 } else { raw };
    if adjusted < 0 || adjusted as usize >= len {
        return Err(EvalError::Value(format!(
            "index {} out of range (length {})",
            raw, len
        )));
    }
    Ok(adjusted as usize)
}

/// Numeric coercion: numbers pass through, booleans count as 0/1, and a
/// string must parse fully as a number.
fn as_number(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Num(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EvalError::Value(format!("not a number: '{}'", s))),
        Value::List(_) => Err(EvalError::Value("not a number: list".to_string())),
    }
}

fn as_str(value: &Value, what: &str) -> Result<String, EvalError> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Num(n) => Ok(num_to_string(*n)),
        other => Err(EvalError::Value(format!(
            "{} expects a string, got a {}",
            what,
            other.kind()
        ))),
    }
}

/// Does the value look numeric, so that comparisons go through numbers?
fn looks_numeric(value: &Value) -> bool {
    match value {
        Value::Num(_) => true,
        Value::Str(s) => s.trim().parse::<f64>().is_ok() && !s.trim().is_empty(),
        _ => false,
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, env: &Env) -> Result<Value, EvalError> {
    // Logical operators short-circuit.
    match op {
        BinaryOp::And => {
            let l = eval_expr(left, env)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval_expr(right, env)?.is_truthy()));
        }
        BinaryOp::Or => {
            let l = eval_expr(left, env)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval_expr(right, env)?.is_truthy()));
        }
        _ => {}
    }

    let l = eval_expr(left, env)?;
    let r = eval_expr(right, env)?;

    match op {
        BinaryOp::Add => match (&l, &r) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.clone();
                items.extend(b.iter().cloned());
                Ok(Value::List(items))
            }
            _ => Ok(Value::Num(as_number(&l)? + as_number(&r)?)),
        },
        BinaryOp::Sub => Ok(Value::Num(as_number(&l)? - as_number(&r)?)),
        BinaryOp::Mul => Ok(Value::Num(as_number(&l)? * as_number(&r)?)),
        BinaryOp::Div => {
            let d = as_number(&r)?;
            if d == 0.0 {
                return Err(EvalError::Value("division by 0".to_string()));
            }
            Ok(Value::Num(as_number(&l)? / d))
        }
        BinaryOp::Mod => {
            let d = as_number(&r)?;
            if d == 0.0 {
                return Err(EvalError::Value("division by 0".to_string()));
            }
            Ok(Value::Num(as_number(&l)? % d))
        }
        BinaryOp::Eq => Ok(Value::Bool(compare_eq(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!compare_eq(&l, &r))),
        BinaryOp::Lt => compare_order(&l, &r).map(|o| Value::Bool(o == std::cmp::Ordering::Less)),
        BinaryOp::Le => compare_order(&l, &r).map(|o| Value::Bool(o != std::cmp::Ordering::Greater)),
        BinaryOp::Gt => compare_order(&l, &r).map(|o| Value::Bool(o == std::cmp::Ordering::Greater)),
        BinaryOp::Ge => compare_order(&l, &r).map(|o| Value::Bool(o != std::cmp::Ordering::Less)),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

/// Equality: numeric when both sides look numeric, textual otherwise,
/// structural for lists.
fn compare_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| compare_eq(x, y))
        }
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ if looks_numeric(l) && looks_numeric(r) => {
            as_number(l).ok() == as_number(r).ok()
        }
        _ => l.to_string() == r.to_string(),
    }
}

fn compare_order(l: &Value, r: &Value) -> Result<std::cmp::Ordering, EvalError> {
    if looks_numeric(l) && looks_numeric(r) {
        let a = as_number(l)?;
        let b = as_number(r)?;
        return a
            .partial_cmp(&b)
            .ok_or_else(|| EvalError::Value("incomparable numbers".to_string()));
    }
    match (l, r) {
        (Value::List(_), _) | (_, Value::List(_)) => {
            Err(EvalError::Value("cannot order lists".to_string()))
        }
        _ => Ok(l.to_string().cmp(&r.to_string())),
    }
}

// ─── Builtin Functions ───────────────────────────────────────

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::Value(format!(
            "{}() takes {} argument{}, got {}",
            name,
            expected,
            if expected == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "basename" => {
            arity(name, args, 1)?;
            let p = as_str(&args[0], name)?;
            Ok(Value::Str(
                Path::new(&p)
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ))
        }
        "dirname" => {
            arity(name, args, 1)?;
            let p = as_str(&args[0], name)?;
            let parent = Path::new(&p)
                .parent()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Value::Str(if parent.is_empty() {
                ".".to_string()
            } else {
                parent
            }))
        }
        "stem" => {
            arity(name, args, 1)?;
            let p = as_str(&args[0], name)?;
            Ok(Value::Str(
                Path::new(&p)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ))
        }
        "ext" => {
            arity(name, args, 1)?;
            let p = as_str(&args[0], name)?;
            Ok(Value::Str(
                Path::new(&p)
                    .extension()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ))
        }
        "join" => {
            arity(name, args, 2)?;
            let sep = as_str(&args[1], name)?;
            match &args[0] {
                Value::List(items) => {
                    let texts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                    Ok(Value::Str(texts.join(&sep)))
                }
                other => Err(EvalError::Value(format!(
                    "join() expects a list, got a {}",
                    other.kind()
                ))),
            }
        }
        "split" => {
            if args.len() != 1 && args.len() != 2 {
                return Err(EvalError::Value(format!(
                    "split() takes 1 or 2 arguments, got {}",
                    args.len()
                )));
            }
            let s = as_str(&args[0], name)?;
            let parts: Vec<Value> = if args.len() == 2 {
                let sep = as_str(&args[1], name)?;
                if sep.is_empty() {
                    return Err(EvalError::Value("split() separator is empty".to_string()));
                }
                s.split(&sep).map(|p| Value::Str(p.to_string())).collect()
            } else {
                s.split_whitespace()
                    .map(|p| Value::Str(p.to_string()))
                    .collect()
            };
            Ok(Value::List(parts))
        }
        "replace" => {
            arity(name, args, 3)?;
            let s = as_str(&args[0], name)?;
            let from = as_str(&args[1], name)?;
            let to = as_str(&args[2], name)?;
            Ok(Value::Str(s.replace(&from, &to)))
        }
        "upper" => {
            arity(name, args, 1)?;
            Ok(Value::Str(as_str(&args[0], name)?.to_uppercase()))
        }
        "lower" => {
            arity(name, args, 1)?;
            Ok(Value::Str(as_str(&args[0], name)?.to_lowercase()))
        }
        "trim" => {
            arity(name, args, 1)?;
            Ok(Value::Str(as_str(&args[0], name)?.trim().to_string()))
        }
        "len" => {
            arity(name, args, 1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
                Value::List(items) => Ok(Value::Num(items.len() as f64)),
                other => Err(EvalError::Value(format!(
                    "len() expects a string or list, got a {}",
                    other.kind()
                ))),
            }
        }
        "str" => {
            arity(name, args, 1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "num" => {
            arity(name, args, 1)?;
            Ok(Value::Num(as_number(&args[0])?))
        }
        _ => Err(EvalError::Name(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &[(&str, Value)]) -> Env {
        let mut env = Env::new();
        for (k, v) in pairs {
            env.set(*k, v.clone());
        }
        env
    }

    fn eval(input: &str, env: &Env) -> Result<Value, EvalError> {
        ExprEvaluator::new().evaluate(input, env)
    }

    #[test]
    fn test_arithmetic() {
        let env = Env::new();
        assert_eq!(eval("(1 + 2 * 3)", &env).unwrap(), Value::Num(7.0));
        assert_eq!(eval("(10 / 4)", &env).unwrap(), Value::Num(2.5));
        assert_eq!(eval("(7 % 3)", &env).unwrap(), Value::Num(1.0));
    }

    #[test]
    fn test_division_by_zero() {
        let env = Env::new();
        assert!(matches!(eval("(1 / 0)", &env), Err(EvalError::Value(_))));
    }

    #[test]
    fn test_string_concat_and_captured_arithmetic() {
        let env = env_with(&[("n", Value::Str("3".to_string()))]);
        assert_eq!(
            eval("('a' + 'b')", &env).unwrap(),
            Value::Str("ab".to_string())
        );
        // Captured groups are strings but participate in arithmetic.
        assert_eq!(eval("(n + 1)", &env).unwrap(), Value::Num(4.0));
    }

    #[test]
    fn test_variable_lookup_and_name_error() {
        let env = env_with(&[("x", Value::Num(5.0))]);
        assert_eq!(eval("(x)", &env).unwrap(), Value::Num(5.0));
        match eval("(nope)", &env) {
            Err(EvalError::Name(n)) => assert_eq!(n, "nope"),
            other => panic!("expected name error, got {:?}", other),
        }
    }

    #[test]
    fn test_comparisons_numeric_and_textual() {
        let env = Env::new();
        assert_eq!(eval("('10' > '9')", &env).unwrap(), Value::Bool(true));
        assert_eq!(eval("('b' > 'a')", &env).unwrap(), Value::Bool(true));
        assert_eq!(eval("(2 == '2')", &env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logic_short_circuits() {
        let env = Env::new();
        // The right side would be a name error if evaluated.
        assert_eq!(eval("(False && nope)", &env).unwrap(), Value::Bool(false));
        assert_eq!(eval("(True || nope)", &env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_ternary() {
        let env = env_with(&[("x", Value::Num(1.0))]);
        assert_eq!(
            eval("(x ? 'yes' : 'no')", &env).unwrap(),
            Value::Str("yes".to_string())
        );
    }

    #[test]
    fn test_tuple_and_index() {
        let env = Env::new();
        assert_eq!(
            eval("(('a', 'b', 'c')[1])", &env).unwrap(),
            Value::Str("b".to_string())
        );
        assert_eq!(
            eval("(('a', 'b', 'c')[-1])", &env).unwrap(),
            Value::Str("c".to_string())
        );
        assert!(matches!(
            eval("(('a')[5])", &env),
            Err(EvalError::Value(_))
        ));
    }

    #[test]
    fn test_path_builtins() {
        let env = Env::new();
        assert_eq!(
            eval("(basename('a/b/c.txt'))", &env).unwrap(),
            Value::Str("c.txt".to_string())
        );
        assert_eq!(
            eval("(dirname('a/b/c.txt'))", &env).unwrap(),
            Value::Str("a/b".to_string())
        );
        assert_eq!(
            eval("(stem('a/b/c.txt'))", &env).unwrap(),
            Value::Str("c".to_string())
        );
        assert_eq!(
            eval("(ext('a/b/c.txt'))", &env).unwrap(),
            Value::Str("txt".to_string())
        );
        assert_eq!(
            eval("(dirname('c.txt'))", &env).unwrap(),
            Value::Str(".".to_string())
        );
    }

    #[test]
    fn test_split_join_replace() {
        let env = Env::new();
        assert_eq!(
            eval("(join(split('a b  c'), ','))", &env).unwrap(),
            Value::Str("a,b,c".to_string())
        );
        assert_eq!(
            eval("(replace('a.b.c', '.', '/'))", &env).unwrap(),
            Value::Str("a/b/c".to_string())
        );
    }

    #[test]
    fn test_unknown_function_is_name_error() {
        let env = Env::new();
        assert!(matches!(eval("(frob('x'))", &env), Err(EvalError::Name(_))));
    }

    #[test]
    fn test_run_prelude_binds_names() {
        let mut env = Env::new();
        let code = "\n# helper bindings\nroot = 'build'\nout = root + '/obj'\n";
        ExprEvaluator::new().run_prelude(code, &mut env).unwrap();
        assert_eq!(env.get("out"), Some(&Value::Str("build/obj".to_string())));
    }

    #[test]
    fn test_run_prelude_rejects_bad_statement() {
        let mut env = Env::new();
        assert!(matches!(
            ExprEvaluator::new().run_prelude("1 + 2", &mut env),
            Err(EvalError::Syntax(_))
        ));
    }
}

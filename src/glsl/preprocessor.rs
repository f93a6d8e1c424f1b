//! Constant-folding interpreter for the `#define`/`#if` directive families.
//!
//! Emission suppression uses a scope counter over nested conditionals with a
//! cursor recording the innermost scope at which output is disabled.

use hashbrown::HashMap;

use super::ast::{BinOp, Expr, LogicalOp, UnOp};
use super::lexer::{Directive, Spanned, Token};
use super::parser::parse_expr;

#[derive(Clone, Debug)]
pub struct Define {
    /// Parameter names for a function-like macro.
    pub params: Option<Vec<String>>,
    /// `None` for a bare `#define FLAG`.
    pub body: Option<Expr>,
}

#[derive(Debug, Default)]
pub struct Preprocessor {
    defines: HashMap<String, Define>,
    frames: Vec<IfFrame>,
}

#[derive(Copy, Clone, Debug)]
struct IfFrame {
    parent_live: bool,
    taken: bool,
    live: bool,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` while inside the disabled branch of a conditional.
    pub fn live(&self) -> bool {
        self.frames.last().is_none_or(|f| f.live)
    }

    pub fn define(&self, name: &str) -> Option<&Define> {
        self.defines.get(name)
    }

    /// Expands a function-like macro by textual argument binding.
    pub fn expand_call(&self, name: &str, args: &[Expr]) -> Option<Expr> {
        let define = self.defines.get(name)?;
        let params = define.params.as_ref()?;
        let body = define.body.as_ref()?;
        if params.len() != args.len() {
            return None;
        }

        let bindings: HashMap<&str, &Expr> = params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();
        Some(substitute(body, &bindings))
    }

    pub fn directive(&mut self, directive: &Directive) -> Result<(), String> {
        match directive.name.as_str() {
            "version" | "extension" | "pragma" => Ok(()),
            "define" => {
                if !self.live() {
                    return Ok(());
                }
                self.parse_define(&directive.tokens)
            }
            "undef" => {
                if self.live() {
                    if let Some(Token::Ident(name)) = directive.tokens.first().map(|s| &s.token) {
                        self.defines.remove(name);
                    }
                }
                Ok(())
            }
            "if" => {
                let cond = self.live() && self.eval_tokens(&directive.tokens)? != 0;
                self.push_frame(cond);
                Ok(())
            }
            "ifdef" => {
                let cond = self.live() && self.first_ident_defined(&directive.tokens);
                self.push_frame(cond);
                Ok(())
            }
            "ifndef" => {
                let cond = self.live() && !self.first_ident_defined(&directive.tokens);
                self.push_frame(cond);
                Ok(())
            }
            "elif" => {
                let value = self.eval_tokens(&directive.tokens)?;
                let frame = self
                    .frames
                    .last_mut()
                    .ok_or_else(|| "#elif without #if".to_owned())?;
                frame.live = frame.parent_live && !frame.taken && value != 0;
                frame.taken |= frame.live;
                Ok(())
            }
            "else" => {
                let frame = self
                    .frames
                    .last_mut()
                    .ok_or_else(|| "#else without #if".to_owned())?;
                frame.live = frame.parent_live && !frame.taken;
                frame.taken = true;
                Ok(())
            }
            "endif" => {
                self.frames
                    .pop()
                    .map(|_| ())
                    .ok_or_else(|| "#endif without #if".to_owned())
            }
            other => {
                tracing::warn!("ignoring unknown preprocessor directive #{other}");
                Ok(())
            }
        }
    }

    fn push_frame(&mut self, cond: bool) {
        self.frames.push(IfFrame {
            parent_live: self.live(),
            taken: cond,
            live: cond,
        });
    }

    fn first_ident_defined(&self, tokens: &[Spanned]) -> bool {
        match tokens.first().map(|s| &s.token) {
            Some(Token::Ident(name)) => self.defines.contains_key(name),
            _ => false,
        }
    }

    fn parse_define(&mut self, tokens: &[Spanned]) -> Result<(), String> {
        let Some(Token::Ident(name)) = tokens.first().map(|s| &s.token) else {
            return Err("#define without a name".to_owned());
        };

        let mut rest = &tokens[1..];
        let mut params = None;
        if matches!(
            rest.first().map(|s| &s.token),
            Some(Token::Punct(super::lexer::Punct::LParen))
        ) {
            let mut names = Vec::new();
            let mut index = 1;
            loop {
                match rest.get(index).map(|s| &s.token) {
                    Some(Token::Ident(param)) => {
                        names.push(param.clone());
                        index += 1;
                    }
                    Some(Token::Punct(super::lexer::Punct::RParen)) => {
                        index += 1;
                        break;
                    }
                    Some(Token::Punct(super::lexer::Punct::Comma)) => {
                        index += 1;
                    }
                    other => return Err(format!("bad macro parameter list: {other:?}")),
                }
            }
            params = Some(names);
            rest = &rest[index..];
        }

        let body = if rest.is_empty() {
            None
        } else {
            match parse_expr(rest) {
                Ok(expr) => Some(expr),
                Err(err) => {
                    return Err(format!("macro {name} body is not an expression: {err}"));
                }
            }
        };

        self.defines.insert(name.clone(), Define { params, body });
        Ok(())
    }

    fn eval_tokens(&self, tokens: &[Spanned]) -> Result<i64, String> {
        let expr =
            parse_expr(tokens).map_err(|err| format!("bad conditional expression: {err}"))?;
        Ok(self.eval(&expr, 0))
    }

    /// Folds a directive condition to an integer. Undefined identifiers
    /// fold to 0, mirroring the legacy preprocessor.
    pub fn eval(&self, expr: &Expr, depth: u32) -> i64 {
        if depth > 32 {
            return 0;
        }

        match expr {
            Expr::Int(v) => *v,
            Expr::Uint(v) => *v as i64,
            Expr::Float(v) => *v as i64,
            Expr::Bool(v) => i64::from(*v),
            Expr::Ident(name) => match self.defines.get(name) {
                Some(Define {
                    body: Some(body), ..
                }) => self.eval(body, depth + 1),
                Some(Define { body: None, .. }) => 1,
                None => 0,
            },
            Expr::Call(call) if call.callee == "defined" => match call.args.first() {
                Some(Expr::Ident(name)) => i64::from(self.defines.contains_key(name)),
                _ => 0,
            },
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, depth + 1);
                match op {
                    UnOp::Not => i64::from(value == 0),
                    UnOp::Neg => -value,
                    UnOp::BitNot => !value,
                }
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, depth + 1);
                let r = self.eval(right, depth + 1);
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l.checked_div(r).unwrap_or(0),
                    BinOp::Rem => l.checked_rem(r).unwrap_or(0),
                    BinOp::Lt => i64::from(l < r),
                    BinOp::Gt => i64::from(l > r),
                    BinOp::Le => i64::from(l <= r),
                    BinOp::Ge => i64::from(l >= r),
                    BinOp::Eq => i64::from(l == r),
                    BinOp::Ne => i64::from(l != r),
                    BinOp::BitAnd => l & r,
                    BinOp::BitOr => l | r,
                    BinOp::BitXor => l ^ r,
                    BinOp::Shl => l.checked_shl(r as u32).unwrap_or(0),
                    BinOp::Shr => l.checked_shr(r as u32).unwrap_or(0),
                }
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left, depth + 1) != 0;
                match op {
                    LogicalOp::And => i64::from(l && self.eval(right, depth + 1) != 0),
                    LogicalOp::Or => i64::from(l || self.eval(right, depth + 1) != 0),
                }
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, depth + 1) != 0 {
                    self.eval(then, depth + 1)
                } else {
                    self.eval(otherwise, depth + 1)
                }
            }
            _ => 0,
        }
    }
}

fn substitute(expr: &Expr, bindings: &HashMap<&str, &Expr>) -> Expr {
    match expr {
        Expr::Ident(name) => match bindings.get(name.as_str()) {
            Some(replacement) => (*replacement).clone(),
            None => expr.clone(),
        },
        Expr::Call(call) => Expr::Call(super::ast::CallExpr {
            callee: call.callee.clone(),
            args: call.args.iter().map(|a| substitute(a, bindings)).collect(),
        }),
        Expr::ArrayCtor { ty, len, args } => Expr::ArrayCtor {
            ty: ty.clone(),
            len: len.as_ref().map(|l| Box::new(substitute(l, bindings))),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
        },
        Expr::Assign { op, target, value } => Expr::Assign {
            op: *op,
            target: Box::new(substitute(target, bindings)),
            value: Box::new(substitute(value, bindings)),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(substitute(left, bindings)),
            right: Box::new(substitute(right, bindings)),
        },
        Expr::Unary { op, expr } => Expr::Unary {
            op: *op,
            expr: Box::new(substitute(expr, bindings)),
        },
        Expr::Update { op, prefix, expr } => Expr::Update {
            op: *op,
            prefix: *prefix,
            expr: Box::new(substitute(expr, bindings)),
        },
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => Expr::Ternary {
            cond: Box::new(substitute(cond, bindings)),
            then: Box::new(substitute(then, bindings)),
            otherwise: Box::new(substitute(otherwise, bindings)),
        },
        Expr::Logical { op, left, right } => Expr::Logical {
            op: *op,
            left: Box::new(substitute(left, bindings)),
            right: Box::new(substitute(right, bindings)),
        },
        Expr::Member { base, member } => Expr::Member {
            base: Box::new(substitute(base, bindings)),
            member: member.clone(),
        },
        Expr::Index { base, index } => Expr::Index {
            base: Box::new(substitute(base, bindings)),
            index: Box::new(substitute(index, bindings)),
        },
        other => other.clone(),
    }
}

//! Recursive-descent parser for the supported GLSL ES subset.

use hashbrown::HashSet;

use super::ast::{
    AssignOp, BinOp, CallExpr, Declaration, Declarator, Expr, ForStmt, FunctionDecl, IfStmt,
    LogicalOp, Param, ParamDirection, Qualifier, Stmt, StructDecl, StructFieldDecl, TypeSpec,
    UnOp, UpdateOp,
};
use super::lexer::{Kw, Punct, Spanned, Token};
use super::ParseError;
use crate::types::GlslType;

pub fn parse(tokens: Vec<Spanned>) -> Result<Vec<Stmt>, ParseError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        struct_names: HashSet::new(),
    };

    let mut stmts = Vec::new();
    while !parser.at_end() {
        stmts.push(parser.statement()?);
    }
    Ok(stmts)
}

/// Parses a directive body or macro replacement as a single expression.
pub fn parse_expr(tokens: &[Spanned]) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        tokens: tokens.to_vec(),
        pos: 0,
        struct_names: HashSet::new(),
    };
    parser.expr()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    struct_names: HashSet<String>,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|s| &s.token)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |s| s.line)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message.into())
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|s| s.token.clone())
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn at_punct(&self, punct: Punct) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn at_kw(&self, kw: Kw) -> bool {
        matches!(self.peek(), Some(Token::Kw(k)) if *k == kw)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.at_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<(), ParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected {punct:?}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected identifier, found {other:?}"))),
        }
    }

    fn is_type_name(&self, name: &str) -> bool {
        GlslType::from_glsl_name(name).is_some() || self.struct_names.contains(name)
    }

    // Statements

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Some(Token::Directive(_)) => {
                let Token::Directive(directive) = self.next()? else {
                    unreachable!();
                };
                Ok(Stmt::Directive(directive))
            }
            Some(Token::Punct(Punct::Semi)) => {
                self.pos += 1;
                Ok(Stmt::Empty)
            }
            Some(Token::Punct(Punct::LBrace)) => Ok(Stmt::Block(self.block()?)),
            Some(Token::Kw(Kw::Precision)) => {
                while !self.at_end() && !self.eat_punct(Punct::Semi) {
                    self.pos += 1;
                }
                Ok(Stmt::Precision)
            }
            Some(Token::Kw(Kw::Struct)) => self.struct_decl(),
            Some(Token::Kw(Kw::Return)) => {
                self.pos += 1;
                let value = if self.at_punct(Punct::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Return(value))
            }
            Some(Token::Kw(Kw::Discard)) => {
                self.pos += 1;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Discard)
            }
            Some(Token::Kw(Kw::Break)) => {
                self.pos += 1;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Break)
            }
            Some(Token::Kw(Kw::Continue)) => {
                self.pos += 1;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Continue)
            }
            Some(Token::Kw(Kw::If)) => self.if_stmt(),
            Some(Token::Kw(Kw::For)) => self.for_stmt(),
            Some(Token::Kw(
                Kw::Attribute
                | Kw::Varying
                | Kw::Uniform
                | Kw::Const
                | Kw::In
                | Kw::Out
                | Kw::InOut
                | Kw::Layout
                | Kw::Highp
                | Kw::Mediump
                | Kw::Lowp,
            )) => self.declaration_or_function(),
            Some(Token::Ident(name)) if self.starts_declaration(name) => {
                self.declaration_or_function()
            }
            _ => {
                let expr = self.expr()?;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// A leading type name starts a declaration only when followed by
    /// another identifier (`vec2 pos`), not a constructor call (`vec2(`).
    fn starts_declaration(&self, name: &str) -> bool {
        if !self.is_type_name(name) {
            return false;
        }
        matches!(self.peek_nth(1), Some(Token::Ident(_)))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_punct(Punct::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat_punct(Punct::RBrace) {
            if self.at_end() {
                return Err(self.error("unterminated block"));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.at_punct(Punct::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.expect_kw(Kw::If)?;
        self.expect_punct(Punct::LParen)?;
        let cond = self.expr()?;
        self.expect_punct(Punct::RParen)?;
        let then = self.body()?;
        let otherwise = if self.eat_kw(Kw::Else) {
            Some(self.body()?)
        } else {
            None
        };
        Ok(Stmt::If(IfStmt {
            cond,
            then,
            otherwise,
        }))
    }

    fn expect_kw(&mut self, kw: Kw) -> Result<(), ParseError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected {kw:?}, found {:?}", self.peek())))
        }
    }

    fn for_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.expect_kw(Kw::For)?;
        self.expect_punct(Punct::LParen)?;

        let init = if self.eat_punct(Punct::Semi) {
            None
        } else {
            Some(Box::new(self.statement()?))
        };
        let cond = if self.at_punct(Punct::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect_punct(Punct::Semi)?;
        let step = if self.at_punct(Punct::RParen) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect_punct(Punct::RParen)?;
        let body = self.body()?;

        Ok(Stmt::For(ForStmt {
            init,
            cond,
            step,
            body,
        }))
    }

    fn struct_decl(&mut self) -> Result<Stmt, ParseError> {
        self.expect_kw(Kw::Struct)?;
        let name = self.expect_ident()?;
        self.struct_names.insert(name.clone());
        self.expect_punct(Punct::LBrace)?;

        let mut fields = Vec::new();
        while !self.eat_punct(Punct::RBrace) {
            if self.at_end() {
                return Err(self.error("unterminated struct declaration"));
            }
            self.skip_precision_qualifier();
            let ty = self.type_spec()?;
            loop {
                let field_name = self.expect_ident()?;
                let array_len = self.array_suffix()?;
                fields.push(StructFieldDecl {
                    ty: ty.clone(),
                    name: field_name,
                    array_len,
                });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi)?;
        }

        // Trailing declarators: `struct S { ... } instance;`
        let mut declarators = Vec::new();
        while let Some(Token::Ident(_)) = self.peek() {
            let declarator_name = self.expect_ident()?;
            let array_len = self.array_suffix()?;
            declarators.push(Declarator {
                name: declarator_name,
                array_len,
                init: None,
            });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi)?;

        let decl = StructDecl { name, fields };
        if declarators.is_empty() {
            Ok(Stmt::Struct(decl))
        } else {
            // Keep the type declaration; the instance becomes a plain
            // declaration of the struct type.
            let instance = Declaration {
                qualifier: None,
                layout_location: None,
                ty: TypeSpec {
                    name: decl.name.clone(),
                    array_len: None,
                },
                declarators,
            };
            Ok(Stmt::Block(vec![
                Stmt::Struct(decl),
                Stmt::Declaration(instance),
            ]))
        }
    }

    fn skip_precision_qualifier(&mut self) {
        while self.eat_kw(Kw::Highp) || self.eat_kw(Kw::Mediump) || self.eat_kw(Kw::Lowp) {}
    }

    fn layout_qualifier(&mut self) -> Result<Option<u32>, ParseError> {
        if !self.eat_kw(Kw::Layout) {
            return Ok(None);
        }
        self.expect_punct(Punct::LParen)?;
        let mut location = None;
        loop {
            let key = self.expect_ident()?;
            if self.eat_punct(Punct::Eq) {
                let value = match self.next()? {
                    Token::Int(v) => v,
                    other => {
                        return Err(self.error(format!("expected layout value, found {other:?}")))
                    }
                };
                if key == "location" {
                    location = Some(value as u32);
                }
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(location)
    }

    fn declaration_or_function(&mut self) -> Result<Stmt, ParseError> {
        let layout_location = self.layout_qualifier()?;

        let mut qualifier = None;
        loop {
            let role = match self.peek() {
                Some(Token::Kw(Kw::Attribute)) => Some(Qualifier::Attribute),
                Some(Token::Kw(Kw::Varying)) => Some(Qualifier::Varying),
                Some(Token::Kw(Kw::Uniform)) => Some(Qualifier::Uniform),
                Some(Token::Kw(Kw::Const)) => Some(Qualifier::Const),
                Some(Token::Kw(Kw::In)) => Some(Qualifier::In),
                Some(Token::Kw(Kw::Out)) => Some(Qualifier::Out),
                Some(Token::Kw(Kw::Highp | Kw::Mediump | Kw::Lowp)) => None,
                _ => break,
            };
            match role {
                Some(role) => {
                    self.pos += 1;
                    // `const in` keeps the role qualifier over `const`.
                    if qualifier.is_none() || qualifier == Some(Qualifier::Const) {
                        qualifier = Some(role);
                    }
                }
                None => {
                    if !(self.eat_kw(Kw::Highp) || self.eat_kw(Kw::Mediump) || self.eat_kw(Kw::Lowp))
                    {
                        break;
                    }
                }
            }
        }

        let ty = self.type_spec()?;
        let name = self.expect_ident()?;

        if self.at_punct(Punct::LParen) {
            return self.function(ty, name);
        }

        let mut declarators = Vec::new();
        let mut current = name;
        loop {
            let array_len = self.array_suffix()?;
            let init = if self.eat_punct(Punct::Eq) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarators.push(Declarator {
                name: current,
                array_len,
                init,
            });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
            current = self.expect_ident()?;
        }
        self.expect_punct(Punct::Semi)?;

        Ok(Stmt::Declaration(Declaration {
            qualifier,
            layout_location,
            ty,
            declarators,
        }))
    }

    fn function(&mut self, return_type: TypeSpec, name: String) -> Result<Stmt, ParseError> {
        self.expect_punct(Punct::LParen)?;

        let mut params = Vec::new();
        if !self.eat_punct(Punct::RParen) {
            loop {
                let direction = if self.eat_kw(Kw::InOut) {
                    ParamDirection::InOut
                } else if self.eat_kw(Kw::Out) {
                    ParamDirection::Out
                } else {
                    self.eat_kw(Kw::In);
                    ParamDirection::In
                };
                self.skip_precision_qualifier();
                let ty = self.type_spec()?;

                // `f(void)` declares no parameters.
                if ty.name == "void" && self.at_punct(Punct::RParen) {
                    self.pos += 1;
                    break;
                }

                let param_name = self.expect_ident()?;
                params.push(Param {
                    direction,
                    ty,
                    name: param_name,
                });
                if self.eat_punct(Punct::RParen) {
                    break;
                }
                self.expect_punct(Punct::Comma)?;
            }
        }

        let body = if self.eat_punct(Punct::Semi) {
            None
        } else {
            Some(self.block()?)
        };

        Ok(Stmt::Function(FunctionDecl {
            return_type,
            name,
            params,
            body,
        }))
    }

    fn type_spec(&mut self) -> Result<TypeSpec, ParseError> {
        let name = self.expect_ident()?;
        let array_len = self.array_suffix()?.map(Box::new);
        Ok(TypeSpec { name, array_len })
    }

    fn array_suffix(&mut self) -> Result<Option<Expr>, ParseError> {
        if !self.eat_punct(Punct::LBracket) {
            return Ok(None);
        }
        let len = self.expr()?;
        self.expect_punct(Punct::RBracket)?;
        Ok(Some(len))
    }

    // Expressions, lowest precedence first.

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let left = self.ternary()?;

        let op = match self.peek() {
            Some(Token::Punct(Punct::Eq)) => AssignOp::Assign,
            Some(Token::Punct(Punct::PlusEq)) => AssignOp::Add,
            Some(Token::Punct(Punct::MinusEq)) => AssignOp::Sub,
            Some(Token::Punct(Punct::StarEq)) => AssignOp::Mul,
            Some(Token::Punct(Punct::SlashEq)) => AssignOp::Div,
            Some(Token::Punct(Punct::PercentEq)) => AssignOp::Rem,
            _ => return Ok(left),
        };
        self.pos += 1;

        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
        })
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.logical_or()?;
        if !self.eat_punct(Punct::Question) {
            return Ok(cond);
        }
        let then = self.expr()?;
        self.expect_punct(Punct::Colon)?;
        let otherwise = self.assignment()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.logical_and()?;
        while self.eat_punct(Punct::OrOr) {
            let right = self.logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.bitwise()?;
        while self.eat_punct(Punct::AndAnd) {
            let right = self.bitwise()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn bitwise(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(Punct::Amp)) => BinOp::BitAnd,
                Some(Token::Punct(Punct::Pipe)) => BinOp::BitOr,
                Some(Token::Punct(Punct::Caret)) => BinOp::BitXor,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.equality()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(Punct::EqEq)) => BinOp::Eq,
                Some(Token::Punct(Punct::Ne)) => BinOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.shift()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(Punct::Lt)) => BinOp::Lt,
                Some(Token::Punct(Punct::Gt)) => BinOp::Gt,
                Some(Token::Punct(Punct::Le)) => BinOp::Le,
                Some(Token::Punct(Punct::Ge)) => BinOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.shift()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(Punct::Shl)) => BinOp::Shl,
                Some(Token::Punct(Punct::Shr)) => BinOp::Shr,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(Punct::Plus)) => BinOp::Add,
                Some(Token::Punct(Punct::Minus)) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(Punct::Star)) => BinOp::Mul,
                Some(Token::Punct(Punct::Slash)) => BinOp::Div,
                Some(Token::Punct(Punct::Percent)) => BinOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Punct(Punct::Minus)) => {
                self.pos += 1;
                Ok(Expr::Unary {
                    op: UnOp::Neg,
                    expr: Box::new(self.unary()?),
                })
            }
            Some(Token::Punct(Punct::Plus)) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Punct(Punct::Bang)) => {
                self.pos += 1;
                Ok(Expr::Unary {
                    op: UnOp::Not,
                    expr: Box::new(self.unary()?),
                })
            }
            Some(Token::Punct(Punct::Tilde)) => {
                self.pos += 1;
                Ok(Expr::Unary {
                    op: UnOp::BitNot,
                    expr: Box::new(self.unary()?),
                })
            }
            Some(Token::Punct(Punct::Inc)) => {
                self.pos += 1;
                Ok(Expr::Update {
                    op: UpdateOp::Inc,
                    prefix: true,
                    expr: Box::new(self.unary()?),
                })
            }
            Some(Token::Punct(Punct::Dec)) => {
                self.pos += 1;
                Ok(Expr::Update {
                    op: UpdateOp::Dec,
                    prefix: true,
                    expr: Box::new(self.unary()?),
                })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        loop {
            if self.eat_punct(Punct::Dot) {
                let member = self.expect_ident()?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    member,
                };
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.expr()?;
                self.expect_punct(Punct::RBracket)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_punct(Punct::Inc) {
                expr = Expr::Update {
                    op: UpdateOp::Inc,
                    prefix: false,
                    expr: Box::new(expr),
                };
            } else if self.eat_punct(Punct::Dec) {
                expr = Expr::Update {
                    op: UpdateOp::Dec,
                    prefix: false,
                    expr: Box::new(expr),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next()? {
            Token::Int(v) => Ok(Expr::Int(v)),
            Token::Uint(v) => Ok(Expr::Uint(v)),
            Token::Float(v) => Ok(Expr::Float(v)),
            Token::Bool(v) => Ok(Expr::Bool(v)),
            Token::Punct(Punct::LParen) => {
                let expr = self.expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(expr)
            }
            Token::Ident(name) => {
                // `float[3](...)`: an array-specifier constructor.
                if self.is_type_name(&name) && self.at_punct(Punct::LBracket) {
                    self.pos += 1;
                    let len = if self.at_punct(Punct::RBracket) {
                        None
                    } else {
                        Some(Box::new(self.expr()?))
                    };
                    self.expect_punct(Punct::RBracket)?;
                    let args = self.call_args()?;
                    return Ok(Expr::ArrayCtor {
                        ty: TypeSpec {
                            name,
                            array_len: None,
                        },
                        len,
                        args,
                    });
                }

                if self.at_punct(Punct::LParen) {
                    let args = self.call_args()?;
                    return Ok(Expr::Call(CallExpr { callee: name, args }));
                }

                Ok(Expr::Ident(name))
            }
            other => Err(self.error(format!("unexpected token {other:?} in expression"))),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_punct(Punct::LParen)?;
        let mut args = Vec::new();
        if self.eat_punct(Punct::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.eat_punct(Punct::RParen) {
                return Ok(args);
            }
            self.expect_punct(Punct::Comma)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::super::ast::{Expr, Qualifier, Stmt};
    use super::parse;

    fn parse_src(src: &str) -> Vec<Stmt> {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_attribute_declaration() {
        let stmts = parse_src("attribute vec2 a_position;");
        let Stmt::Declaration(decl) = &stmts[0] else {
            panic!("expected declaration, got {:?}", stmts[0]);
        };
        assert_eq!(decl.qualifier, Some(Qualifier::Attribute));
        assert_eq!(decl.ty.name, "vec2");
        assert_eq!(decl.declarators[0].name, "a_position");
    }

    #[test]
    fn parses_layout_location() {
        let stmts = parse_src("layout(location = 3) in vec4 a_color;");
        let Stmt::Declaration(decl) = &stmts[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decl.layout_location, Some(3));
        assert_eq!(decl.qualifier, Some(Qualifier::In));
    }

    #[test]
    fn parses_main_function() {
        let stmts = parse_src("void main() { gl_Position = vec4(0.0); }");
        let Stmt::Function(func) = &stmts[0] else {
            panic!("expected function");
        };
        assert_eq!(func.name, "main");
        assert!(func.params.is_empty());
        assert_eq!(func.body.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn parses_out_parameters() {
        let stmts = parse_src("void split(float x, out float whole) { whole = x; }");
        let Stmt::Function(func) = &stmts[0] else {
            panic!("expected function");
        };
        assert!(!func.params[0].direction.is_pointer());
        assert!(func.params[1].direction.is_pointer());
    }

    #[test]
    fn constructor_call_is_not_a_declaration() {
        let stmts = parse_src("void main() { v = vec2(1.0, 2.0); }");
        let Stmt::Function(func) = &stmts[0] else {
            panic!("expected function");
        };
        let Stmt::Expr(Expr::Assign { .. }) = &func.body.as_ref().unwrap()[0] else {
            panic!("expected assignment statement");
        };
    }

    #[test]
    fn parses_for_loop_with_update() {
        let stmts = parse_src("void main() { for (int i = 0; i < 4; i++) { x += 1.0; } }");
        let Stmt::Function(func) = &stmts[0] else {
            panic!("expected function");
        };
        let Stmt::For(for_stmt) = &func.body.as_ref().unwrap()[0] else {
            panic!("expected for loop");
        };
        assert!(for_stmt.init.is_some());
        assert!(for_stmt.cond.is_some());
        assert!(for_stmt.step.is_some());
    }

    #[test]
    fn parses_struct_with_instance() {
        let stmts = parse_src("struct Light { vec3 dir; float power; } u_light;");
        let Stmt::Block(parts) = &stmts[0] else {
            panic!("expected block wrapper");
        };
        assert!(matches!(&parts[0], Stmt::Struct(decl) if decl.fields.len() == 2));
        assert!(matches!(&parts[1], Stmt::Declaration(_)));
    }

    #[test]
    fn parses_ternary_and_logical() {
        let stmts = parse_src("void main() { x = a && b ? 1.0 : 2.0; }");
        let Stmt::Function(func) = &stmts[0] else {
            panic!("expected function");
        };
        let Stmt::Expr(Expr::Assign { value, .. }) = &func.body.as_ref().unwrap()[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(**value, Expr::Ternary { .. }));
    }

    #[test]
    fn struct_locals_parse_as_declarations() {
        let stmts = parse_src("struct S { float x; }; void main() { S s; s.x = 1.0; }");
        let Stmt::Function(func) = &stmts[1] else {
            panic!("expected function");
        };
        assert!(matches!(
            &func.body.as_ref().unwrap()[0],
            Stmt::Declaration(_)
        ));
    }
}

use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, CatchClause, ClassDecl, EnumMember, Expr, ExprKind, FieldDecl, FunctionDecl,
        ImportTarget, Literal, MethodDecl, Modifiers, NamespaceDecl, NamespaceItem, Program, Stmt,
        StmtKind, StructField, SwitchCase, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
};

pub fn parse_program(source: &str) -> Result<Program, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    fn parse_program(&mut self) -> Result<Program, Diagnostic> {
        let mut items = Vec::new();
        while !self.is_at_end() {
            items.push(self.parse_statement()?);
        }
        Ok(Program { items })
    }

    fn parse_block_items(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            items.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` to close block")?;
        Ok(items)
    }

    fn parse_block(&mut self) -> Result<(Vec<Stmt>, SourceSpan), Diagnostic> {
        let lbrace = self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let items = self.parse_block_items()?;
        Ok((items, lbrace.span.to(self.previous().span)))
    }

    /// Loop and branch bodies: a block or a single statement.
    fn parse_body(&mut self) -> Result<Box<Stmt>, Diagnostic> {
        Ok(Box::new(self.parse_statement()?))
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Var) => self.parse_var_decl(),
            TokenKind::Keyword(Keyword::Const) => self.parse_const_decl(),
            TokenKind::Keyword(Keyword::Function) => {
                let function = self.parse_function()?;
                Ok(Stmt {
                    span: function.span,
                    kind: StmtKind::Function(Rc::new(function)),
                })
            }
            TokenKind::Keyword(Keyword::Class) => self.parse_class(),
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct(),
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(),
            TokenKind::Keyword(Keyword::Library) => self.parse_library(),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Throw) => {
                let start = self.advance().span;
                let value = self.parse_expression()?;
                self.expect_semicolon()?;
                Ok(Stmt {
                    span: start.to(value.span),
                    kind: StmtKind::Throw(value),
                })
            }
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.advance().span;
                self.expect_semicolon()?;
                Ok(Stmt {
                    span,
                    kind: StmtKind::Break,
                })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let span = self.advance().span;
                self.expect_semicolon()?;
                Ok(Stmt {
                    span,
                    kind: StmtKind::Continue,
                })
            }
            TokenKind::LBrace => {
                let (items, span) = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::Block(items),
                    span,
                })
            }
            TokenKind::Semicolon => {
                let span = self.advance().span;
                Ok(Stmt {
                    kind: StmtKind::Block(Vec::new()),
                    span,
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        let (name, initializer) = self.parse_var_parts()?;
        Ok(Stmt {
            kind: StmtKind::VarDecl { name, initializer },
            span: start.to(self.previous().span),
        })
    }

    fn parse_var_parts(&mut self) -> Result<(String, Option<Expr>), Diagnostic> {
        self.consume_keyword(Keyword::Var)?;
        let name_token = self.consume_identifier("expected variable name")?;
        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_semicolon()?;
        Ok((name_token.lexeme, initializer))
    }

    fn parse_const_decl(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        let (name, value) = self.parse_const_parts()?;
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::ConstDecl { name, value },
        })
    }

    fn parse_const_parts(&mut self) -> Result<(String, Expr), Diagnostic> {
        self.consume_keyword(Keyword::Const)?;
        let name_token = self.consume_identifier("expected constant name")?;
        self.consume(TokenKind::Assign, "expected `=` in constant declaration")?;
        let value = self.parse_expression()?;
        self.expect_semicolon()?;
        Ok((name_token.lexeme, value))
    }

    fn parse_params(&mut self) -> Result<Vec<String>, Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` before parameters")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let param = self.consume_identifier("expected parameter name")?;
                if params.contains(&param.lexeme) {
                    return Err(self.error(&param, "duplicate parameter name"));
                }
                params.push(param.lexeme);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        Ok(params)
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, Diagnostic> {
        let start = self.consume_keyword(Keyword::Function)?.span;
        let name_token = self.consume_identifier("expected function name")?;
        self.parse_function_rest(start, name_token.lexeme)
    }

    fn parse_function_rest(
        &mut self,
        start: SourceSpan,
        name: String,
    ) -> Result<FunctionDecl, Diagnostic> {
        let params = self.parse_params()?;
        let (body, span) = self.parse_block()?;
        Ok(FunctionDecl {
            name,
            params,
            body,
            span: start.to(span),
        })
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            if self.matches_keyword(Keyword::Private) {
                modifiers.private = true;
            } else if self.matches_keyword(Keyword::Public) {
                modifiers.private = false;
            } else if self.matches_keyword(Keyword::Static) {
                modifiers.is_static = true;
            } else if self.matches_keyword(Keyword::Const) {
                modifiers.constant = true;
            } else {
                return modifiers;
            }
        }
    }

    fn parse_class(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        let class = self.parse_class_decl()?;
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::Class(Rc::new(class)),
        })
    }

    fn parse_class_decl(&mut self) -> Result<ClassDecl, Diagnostic> {
        self.consume_keyword(Keyword::Class)?;
        let name = self.consume_identifier("expected class name")?.lexeme;
        let superclass = if self.matches_keyword(Keyword::Extends) {
            Some(self.consume_identifier("expected superclass name")?.lexeme)
        } else {
            None
        };
        self.consume(TokenKind::LBrace, "expected `{` after class name")?;

        let mut class = ClassDecl {
            name,
            superclass,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        };
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let member_start = self.peek().span;
            let modifiers = self.parse_modifiers();
            if self.matches_keyword(Keyword::Constructor) {
                let function =
                    self.parse_function_rest(member_start, "constructor".to_string())?;
                class.constructors.push(MethodDecl {
                    modifiers,
                    function: Rc::new(function),
                });
            } else if self.check(TokenKind::Keyword(Keyword::Function)) {
                let mut function = self.parse_function()?;
                function.span = member_start.to(function.span);
                class.methods.push(MethodDecl {
                    modifiers,
                    function: Rc::new(function),
                });
            } else {
                let _ = self.matches_keyword(Keyword::Var);
                let name = self.consume_identifier("expected class member")?;
                if self.check(TokenKind::LParen) {
                    let function = self.parse_function_rest(member_start, name.lexeme)?;
                    class.methods.push(MethodDecl {
                        modifiers,
                        function: Rc::new(function),
                    });
                    continue;
                }
                let default = if self.matches(TokenKind::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.consume(TokenKind::Semicolon, "expected `;` after field declaration")?;
                class.fields.push(FieldDecl {
                    name: name.lexeme,
                    modifiers,
                    default,
                    span: member_start.to(self.previous().span),
                });
            }
        }
        self.consume(TokenKind::RBrace, "expected `}` after class body")?;
        self.consume_optional_semicolon();
        Ok(class)
    }

    fn parse_struct(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Struct)?.span;
        let name = self.consume_identifier("expected struct name")?.lexeme;
        self.consume(TokenKind::LBrace, "expected `{` after struct name")?;
        let mut fields: Vec<StructField> = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let _ = self.matches_keyword(Keyword::Var);
            let field = self.consume_identifier("expected struct field name")?;
            if fields.iter().any(|existing| existing.name == field.lexeme) {
                return Err(self.error(&field, "duplicate struct field"));
            }
            let default = if self.matches(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            fields.push(StructField {
                name: field.lexeme,
                default,
            });
            if !self.matches(TokenKind::Semicolon) && !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "expected `}` after struct fields")?;
        let end = self.previous().span;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: start.to(end),
            kind: StmtKind::Struct { name, fields },
        })
    }

    fn parse_enum(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Enum)?.span;
        let name = self.consume_identifier("expected enum name")?.lexeme;
        self.consume(TokenKind::LBrace, "expected `{` after enum name")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let member = self.consume_identifier("expected enum member")?.lexeme;
            let value = if self.matches(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            members.push(EnumMember {
                name: member,
                value,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "expected `}` after enum members")?;
        let end = self.previous().span;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: start.to(end),
            kind: StmtKind::Enum { name, members },
        })
    }

    fn parse_library(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Library)?.span;
        let name = self.consume_identifier("expected library name")?.lexeme;
        self.consume(TokenKind::LBrace, "expected `{` after library name")?;
        let mut namespaces = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            namespaces.push(self.parse_namespace()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` after library body")?;
        let end = self.previous().span;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: start.to(end),
            kind: StmtKind::Library { name, namespaces },
        })
    }

    fn parse_namespace(&mut self) -> Result<NamespaceDecl, Diagnostic> {
        self.consume_keyword(Keyword::Namespace)?;
        let name = self.consume_identifier("expected namespace name")?.lexeme;
        self.consume(TokenKind::LBrace, "expected `{` after namespace name")?;
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let span = self.peek().span;
            let item = match self.peek().kind {
                TokenKind::Keyword(Keyword::Function) => {
                    NamespaceItem::Function(Rc::new(self.parse_function()?))
                }
                TokenKind::Keyword(Keyword::Namespace) => {
                    NamespaceItem::Namespace(self.parse_namespace()?)
                }
                TokenKind::Keyword(Keyword::Class) => {
                    NamespaceItem::Class(Rc::new(self.parse_class_decl()?))
                }
                TokenKind::Keyword(Keyword::Var) => {
                    let (name, value) = self.parse_var_parts()?;
                    NamespaceItem::Var { name, value }
                }
                TokenKind::Keyword(Keyword::Const) => {
                    let (name, value) = self.parse_const_parts()?;
                    NamespaceItem::Const { name, value }
                }
                _ => {
                    let token = self.peek().clone();
                    return Err(self.error(&token, "unexpected item in namespace"));
                }
            };
            items.push((item, span.to(self.previous().span)));
        }
        self.consume(TokenKind::RBrace, "expected `}` after namespace body")?;
        Ok(NamespaceDecl { name, items })
    }

    fn parse_import(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Import)?.span;
        let target = if self.check(TokenKind::String) {
            ImportTarget::File(self.advance().lexeme)
        } else {
            let mut path = vec![self.consume_identifier("expected import path")?.lexeme];
            let mut wildcard = false;
            while self.matches(TokenKind::Dot) {
                if self.matches(TokenKind::Star) {
                    wildcard = true;
                    break;
                }
                path.push(self.consume_identifier("expected name after `.`")?.lexeme);
            }
            if wildcard {
                ImportTarget::Wildcard(path)
            } else {
                ImportTarget::Path(path)
            }
        };
        let alias = if self.matches_keyword(Keyword::As) {
            Some(self.consume_identifier("expected alias after `as`")?.lexeme)
        } else {
            None
        };
        if alias.is_some() && matches!(target, ImportTarget::Wildcard(_)) {
            let token = self.previous().clone();
            return Err(self.error(&token, "wildcard imports cannot be aliased"));
        }
        self.expect_semicolon()?;
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::Import { target, alias },
        })
    }

    fn parse_condition(&mut self) -> Result<Expr, Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` before condition")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RParen, "expected `)` after condition")?;
        Ok(condition)
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::If)?.span;
        let condition = self.parse_condition()?;
        let then_branch = self.parse_body()?;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::While)?.span;
        let condition = self.parse_condition()?;
        let body = self.parse_body()?;
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Do)?.span;
        let body = self.parse_body()?;
        self.consume_keyword(Keyword::While)?;
        let condition = self.parse_condition()?;
        self.expect_semicolon()?;
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::DoWhile { body, condition },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::For)?.span;
        self.consume(TokenKind::LParen, "expected `(` after `for`")?;

        let declared = matches!(
            self.peek().kind,
            TokenKind::Keyword(Keyword::Var) | TokenKind::Keyword(Keyword::Const)
        );
        let offset = usize::from(declared);
        if self.peek_at(offset).kind == TokenKind::Identifier
            && self.peek_at(offset + 1).kind == TokenKind::Colon
        {
            if declared {
                self.advance();
            }
            let binding = self.advance().lexeme;
            self.consume(TokenKind::Colon, "expected `:` in for-each loop")?;
            let iterable = self.parse_expression()?;
            self.consume(TokenKind::RParen, "expected `)` after for-each header")?;
            let body = self.parse_body()?;
            return Ok(Stmt {
                span: start.to(self.previous().span),
                kind: StmtKind::ForEach {
                    binding,
                    iterable,
                    body,
                },
            });
        }

        let init = if self.matches(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Keyword(Keyword::Var)) {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let expr = self.parse_expression()?;
            self.consume(TokenKind::Semicolon, "expected `;` after loop initializer")?;
            Some(Box::new(Stmt {
                span: expr.span,
                kind: StmtKind::Expr(expr),
            }))
        };
        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "expected `;` after loop condition")?;
        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RParen, "expected `)` after loop header")?;
        let body = self.parse_body()?;
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::For {
                init,
                condition,
                update,
                body,
            },
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Switch)?.span;
        let subject = self.parse_condition()?;
        self.consume(TokenKind::LBrace, "expected `{` after switch subject")?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let label = if self.check(TokenKind::Keyword(Keyword::Case)) {
                let token = self.advance();
                if seen_default {
                    return Err(self.error(&token, "`default` must be the last label of a switch"));
                }
                Some(self.parse_expression()?)
            } else {
                let token = self.consume_keyword(Keyword::Default)?;
                if seen_default {
                    return Err(self.error(&token, "duplicate `default` label"));
                }
                seen_default = true;
                None
            };
            self.consume(TokenKind::Colon, "expected `:` after case label")?;
            let mut body = Vec::new();
            while !self.check(TokenKind::Keyword(Keyword::Case))
                && !self.check(TokenKind::Keyword(Keyword::Default))
                && !self.check(TokenKind::RBrace)
                && !self.is_at_end()
            {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { label, body });
        }
        self.consume(TokenKind::RBrace, "expected `}` after switch cases")?;
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::Switch { subject, cases },
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Try)?;
        let (body, _) = self.parse_block()?;
        let mut catches = Vec::new();
        while self.matches_keyword(Keyword::Catch) {
            self.consume(TokenKind::LParen, "expected `(` after `catch`")?;
            let binding = self.consume_identifier("expected catch binding")?.lexeme;
            self.consume(TokenKind::RParen, "expected `)` after catch binding")?;
            let (body, _) = self.parse_block()?;
            catches.push(CatchClause { binding, body });
        }
        let finally = if self.matches_keyword(Keyword::Finally) {
            Some(self.parse_block()?.0)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            return Err(self.error(&start, "`try` requires a `catch` or `finally` clause"));
        }
        Ok(Stmt {
            span: start.span.to(self.previous().span),
            kind: StmtKind::Try {
                body,
                catches,
                finally,
            },
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.consume_keyword(Keyword::Return)?;
        let expr = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon()?;
        Ok(Stmt {
            span: token.span.to(self.previous().span),
            kind: StmtKind::Return(expr),
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        self.expect_semicolon()?;
        Ok(Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_or()?;
        let compound = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(expr),
        };
        let operator = self.advance();
        let value = self.parse_assignment()?;
        if !is_assignable(&expr) {
            return Err(self.error(&operator, "invalid assignment target"));
        }
        Ok(match compound {
            Some(op) => compound_assignment(op, expr, value),
            None => assignment(expr, value),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.matches(TokenKind::DoublePipe) {
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::DoubleAmpersand) {
            let right = self.parse_equality()?;
            expr = binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = self.advance();
                let target = self.parse_unary()?;
                return self.increment(operator, target);
            }
            _ => return self.parse_postfix(),
        };
        let operator = self.advance().span;
        let right = self.parse_unary()?;
        Ok(Expr {
            span: operator.to(right.span),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(right),
            },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_call()?;
        if matches!(self.peek().kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let operator = self.advance();
            return self.increment(operator, expr);
        }
        Ok(expr)
    }

    /// `x++` and `++x` both become `x += 1`.
    fn increment(&self, operator: Token, target: Expr) -> Result<Expr, Diagnostic> {
        if !is_assignable(&target) {
            return Err(self.error(&operator, "invalid increment target"));
        }
        let op = if operator.kind == TokenKind::PlusPlus {
            BinaryOp::Add
        } else {
            BinaryOp::Sub
        };
        let one = Expr {
            kind: ExprKind::Literal(Literal::Integer(1)),
            span: operator.span,
        };
        Ok(compound_assignment(op, target, one))
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let args = self.parse_arguments()?;
                expr = Expr {
                    span: expr.span.to(self.previous().span),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let bracket = self.consume(TokenKind::RBracket, "expected `]` after index")?;
                expr = Expr {
                    span: expr.span.to(bracket.span),
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else if self.matches(TokenKind::Dot) {
                let ident = self.consume_identifier("expected member name after `.`")?;
                expr = Expr {
                    span: expr.span.to(ident.span),
                    kind: ExprKind::Field {
                        target: Box::new(expr),
                        field: ident.lexeme,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    fn parse_path(&mut self, message: &str) -> Result<Vec<String>, Diagnostic> {
        let mut path = vec![self.consume_identifier(message)?.lexeme];
        while self.matches(TokenKind::Dot) {
            path.push(self.consume_identifier("expected name after `.`")?.lexeme);
        }
        Ok(path)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.advance();
        let kind = match &token.kind {
            TokenKind::Keyword(Keyword::True) => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::Keyword(Keyword::False) => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::Keyword(Keyword::Null) => ExprKind::Literal(Literal::Null),
            TokenKind::Keyword(Keyword::This) => ExprKind::This,
            TokenKind::Integer => match token.lexeme.parse::<i64>() {
                Ok(value) => ExprKind::Literal(Literal::Integer(value)),
                Err(_) => return Err(self.error(&token, "integer literal out of range")),
            },
            TokenKind::Double => match token.lexeme.parse::<f64>() {
                Ok(value) => ExprKind::Literal(Literal::Double(value)),
                Err(_) => return Err(self.error(&token, "malformed floating-point literal")),
            },
            TokenKind::String => ExprKind::Literal(Literal::String(token.lexeme.clone())),
            TokenKind::Identifier => ExprKind::Variable(token.lexeme.clone()),
            TokenKind::Keyword(Keyword::New) => {
                let path = self.parse_path("expected class name after `new`")?;
                self.consume(TokenKind::LParen, "expected `(` after class name")?;
                let args = self.parse_arguments()?;
                ExprKind::New { path, args }
            }
            TokenKind::Ampersand => {
                let path = self.parse_path("expected function name after `&`")?;
                let args = if self.matches(TokenKind::LParen) {
                    self.parse_arguments()?
                } else {
                    Vec::new()
                };
                ExprKind::FunctionRef { path, args }
            }
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RParen, "expected `)` after expression")?;
                ExprKind::Group(Box::new(inner))
            }
            TokenKind::LBracket => {
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RBracket, "expected `]` after array literal")?;
                ExprKind::ArrayLiteral(elements)
            }
            TokenKind::Eof => return Err(self.error(&token, "unexpected end of input")),
            _ => {
                return Err(self.error(
                    &token,
                    &format!("unexpected token `{}` in expression", token.lexeme),
                ))
            }
        };
        Ok(Expr {
            kind,
            span: token.span.to(self.previous().span),
        })
    }

    /// Statements end with `;`, which may be omitted only at the end of input.
    fn expect_semicolon(&mut self) -> Result<(), Diagnostic> {
        if self.matches(TokenKind::Semicolon) || self.is_at_end() {
            return Ok(());
        }
        let token = self.peek().clone();
        Err(self.error(&token, "expected `;`"))
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek(), message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, Diagnostic> {
        let message = format!("expected `{}`", format!("{keyword:?}").to_lowercase());
        self.consume(TokenKind::Keyword(keyword), &message)
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.consume(TokenKind::Identifier, message)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.current + offset).min(last)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::SyntaxError, message.to_string()).with_span(token.span)
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. }
    )
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn compound_assignment(op: BinaryOp, target: Expr, value: Expr) -> Expr {
    Expr {
        span: target.span.to(value.span),
        kind: ExprKind::CompoundAssign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
    }
}

fn assignment(target: Expr, value: Expr) -> Expr {
    Expr {
        span: target.span.to(value.span),
        kind: ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        },
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::{debug, trace};

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Literal, Stmt, StmtKind, SwitchCase, UnaryOp},
    diagnostics::{error_at, DiagnosticKind, Result, SourceSpan, VgError},
    hook::{ExecutionHook, HookControl, HookEvent, HookEventKind},
    module::ModuleRegistry,
    object::{ClassDefinition, Closure, Function, Method},
    output::Output,
    parser,
    scope::{Scope, ScopeStack},
    value::{Value, ValueKind},
};

/// Call depth at which evaluation fails instead of overflowing the host stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

#[derive(Default)]
pub struct ExecutionContext {
    pub current_file: Option<PathBuf>,
    pub(crate) import_chain: Vec<PathBuf>,
    pub(crate) class_stack: Vec<Option<Rc<ClassDefinition>>>,
    pub(crate) call_depth: usize,
}

pub struct Interpreter {
    pub(crate) scopes: ScopeStack,
    pub(crate) context: ExecutionContext,
    pub(crate) registry: ModuleRegistry,
    output: Output,
    hook: Option<Box<dyn ExecutionHook>>,
    max_call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interpreter = Self {
            scopes: ScopeStack::new(),
            context: ExecutionContext::default(),
            registry: ModuleRegistry::new(),
            output: Output::default(),
            hook: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        };
        interpreter.install_prelude();
        interpreter
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn set_hook(&mut self, hook: Box<dyn ExecutionHook>) {
        self.hook = Some(hook);
    }

    pub fn clear_hook(&mut self) {
        self.hook = None;
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.context.current_file.as_deref()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.scopes.lookup(name).ok().flatten()
    }

    /// Runs source text in the global frame. Definitions persist across
    /// calls, which is what the REPL relies on.
    pub fn interpret(&mut self, source: &str) -> Result<Value> {
        let program = parser::parse_program(source)?;
        self.run_program(&program.items)
    }

    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let program = parser::parse_program(&source)?;
        debug!(file = %path.display(), "running script");
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let previous = self.context.current_file.replace(path.to_path_buf());
        self.context.import_chain.push(key);
        let result = self.run_program(&program.items);
        self.context.import_chain.pop();
        self.context.current_file = previous;
        result
    }

    /// Functions and classes are declared before anything else runs. A
    /// class whose superclass or defaults are not resolvable yet (for
    /// example because it extends an imported class) is declared when
    /// execution reaches it instead.
    pub(crate) fn run_program(&mut self, items: &[Stmt]) -> Result<Value> {
        let mut hoisted = vec![false; items.len()];
        for (slot, stmt) in hoisted.iter_mut().zip(items) {
            match &stmt.kind {
                StmtKind::Function(decl) => {
                    self.declare_function(decl);
                    *slot = true;
                }
                StmtKind::Class(decl) => match self.declare_class(decl, None) {
                    Ok(_) => *slot = true,
                    Err(err) if err.kind() == DiagnosticKind::NameError => {
                        debug!(class = %decl.name, "deferring class declaration");
                    }
                    Err(err) => return Err(err.with_span(stmt.span)),
                },
                _ => {}
            }
        }

        let mut last_value = Value::null();
        for (stmt, done) in items.iter().zip(hoisted) {
            if done {
                continue;
            }
            match self.execute_statement(stmt)? {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => last_value = value,
                FlowControl::Return(value) => return Ok(value),
                FlowControl::Break => {
                    return Err(error_at(DiagnosticKind::Runtime, "`break` outside loop", stmt.span));
                }
                FlowControl::Continue => {
                    return Err(error_at(
                        DiagnosticKind::Runtime,
                        "`continue` outside loop",
                        stmt.span,
                    ));
                }
            }
        }
        Ok(last_value)
    }

    pub(crate) fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        self.notify(HookEventKind::Statement, stmt.span)?;
        self.execute_statement_kind(stmt)
            .map_err(|err| err.with_span(stmt.span))
    }

    fn execute_statement_kind(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::VarDecl { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::null(),
                };
                self.scopes.define(name.as_str(), value);
                Ok(FlowControl::Next)
            }
            StmtKind::ConstDecl { name, value } => {
                let evaluated = self.evaluate(value)?;
                self.scopes.define_const(name.as_str(), evaluated);
                Ok(FlowControl::Next)
            }
            StmtKind::Function(decl) => {
                self.declare_function(decl);
                Ok(FlowControl::Next)
            }
            StmtKind::Class(decl) => {
                self.declare_class(decl, None)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Struct { name, fields } => {
                self.declare_struct(name, fields)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Enum { name, members } => {
                self.declare_enum(name, members)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Library { name, namespaces } => {
                self.declare_library(name, namespaces)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Import { target, alias } => {
                self.import(target, alias.as_deref())?;
                Ok(FlowControl::Next)
            }
            StmtKind::Expr(expr) => {
                let value = self.evaluate(expr)?;
                Ok(FlowControl::NextValue(value))
            }
            StmtKind::Block(statements) => {
                self.with_scope(Scope::new(), |interp| interp.execute_block(statements))
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_statement(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_statement(branch)
                } else {
                    Ok(FlowControl::Next)
                }
            }
            StmtKind::While { condition, body } => {
                loop {
                    self.notify(HookEventKind::LoopIteration, stmt.span)?;
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }
                    match self.execute_statement(body)? {
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                        FlowControl::Next | FlowControl::NextValue(_) | FlowControl::Continue => {}
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::DoWhile { body, condition } => {
                loop {
                    self.notify(HookEventKind::LoopIteration, stmt.span)?;
                    match self.execute_statement(body)? {
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                        FlowControl::Next | FlowControl::NextValue(_) | FlowControl::Continue => {}
                    }
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => self.with_scope(Scope::new(), |interp| {
                if let Some(init) = init {
                    interp.execute_for_init(init)?;
                }
                loop {
                    interp.notify(HookEventKind::LoopIteration, stmt.span)?;
                    if let Some(condition) = condition {
                        if !interp.evaluate(condition)?.is_truthy() {
                            break;
                        }
                    }
                    match interp.execute_statement(body)? {
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                        FlowControl::Next | FlowControl::NextValue(_) | FlowControl::Continue => {}
                    }
                    if let Some(update) = update {
                        interp.evaluate(update)?;
                    }
                }
                Ok(FlowControl::Next)
            }),
            StmtKind::ForEach {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.evaluate(iterable)?;
                for item in self.iterate(&iterable)? {
                    self.notify(HookEventKind::LoopIteration, stmt.span)?;
                    let mut scope = Scope::new();
                    scope.define(binding.as_str(), item);
                    match self.with_scope(scope, |interp| interp.execute_statement(body))? {
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                        FlowControl::Next | FlowControl::NextValue(_) | FlowControl::Continue => {}
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Switch { subject, cases } => self.execute_switch(subject, cases),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                let mut outcome = self.with_scope(Scope::new(), |interp| interp.execute_block(body));
                let caught = match &outcome {
                    Err(VgError::Diagnostic(diag)) if diag.kind.is_catchable() => {
                        Some((diag.kind, diag.message.clone()))
                    }
                    _ => None,
                };
                // Only the first clause ever receives the error.
                if let (Some((kind, message)), Some(clause)) = (caught, catches.first()) {
                    debug!(%kind, "caught error");
                    let mut scope = Scope::new();
                    scope.define(clause.binding.as_str(), Value::string(message));
                    outcome = self.with_scope(scope, |interp| interp.execute_block(&clause.body));
                }
                let Some(finally) = finally else {
                    return outcome;
                };
                match self.with_scope(Scope::new(), |interp| interp.execute_block(finally))? {
                    FlowControl::Next | FlowControl::NextValue(_) => outcome,
                    abrupt => Ok(abrupt),
                }
            }
            StmtKind::Throw(expr) => {
                let value = self.evaluate(expr)?;
                Err(error_at(DiagnosticKind::Thrown, value.to_string(), stmt.span))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::null(),
                };
                Ok(FlowControl::Return(value))
            }
            StmtKind::Break => Ok(FlowControl::Break),
            StmtKind::Continue => Ok(FlowControl::Continue),
        }
    }

    pub(crate) fn execute_block(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let mut last_value: Option<Value> = None;
        for stmt in statements {
            match self.execute_statement(stmt)? {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => {
                    last_value = Some(value);
                }
                other => return Ok(other),
            }
        }
        Ok(match last_value {
            Some(value) => FlowControl::NextValue(value),
            None => FlowControl::Next,
        })
    }

    /// `for (i = 0; ...)` declares `i` in the loop frame when no visible
    /// variable of that name exists.
    fn execute_for_init(&mut self, init: &Stmt) -> Result<()> {
        if let StmtKind::Expr(Expr {
            kind: ExprKind::Assign { target, value },
            ..
        }) = &init.kind
        {
            if let ExprKind::Variable(name) = &target.kind {
                if !self.scopes.contains_variable(name) {
                    let value = self.evaluate(value)?;
                    self.scopes.define(name.as_str(), value);
                    return Ok(());
                }
            }
        }
        self.execute_statement(init).map(|_| ())
    }

    /// Labels are evaluated in order until one matches; execution then
    /// falls through the following bodies until a `break`.
    fn execute_switch(&mut self, subject: &Expr, cases: &[SwitchCase]) -> Result<FlowControl> {
        let subject = self.evaluate(subject)?;
        let mut start = None;
        for (idx, case) in cases.iter().enumerate() {
            if let Some(label) = &case.label {
                if self.evaluate(label)?.equals(&subject) {
                    start = Some(idx);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|case| case.label.is_none()))
        else {
            return Ok(FlowControl::Next);
        };
        self.with_scope(Scope::new(), |interp| {
            for case in &cases[start..] {
                match interp.execute_block(&case.body)? {
                    FlowControl::Break => return Ok(FlowControl::Next),
                    FlowControl::Next | FlowControl::NextValue(_) => {}
                    other => return Ok(other),
                }
            }
            Ok(FlowControl::Next)
        })
    }

    fn iterate(&self, value: &Value) -> Result<Vec<Value>> {
        match value.kind() {
            ValueKind::Array(values) => Ok(values.borrow().clone()),
            ValueKind::String(text) => Ok(text
                .chars()
                .map(|ch| Value::string(ch.to_string()))
                .collect()),
            _ => Err(VgError::new(
                DiagnosticKind::TypeError,
                format!("cannot iterate over a value of type {}", value.type_name()),
            )),
        }
    }

    pub(crate) fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        self.evaluate_kind(expr)
            .map_err(|err| err.with_span(expr.span))
    }

    fn evaluate_kind(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(self.literal(literal)),
            ExprKind::Variable(name) => self.lookup_name(name),
            ExprKind::This => self.scopes.lookup("this")?.ok_or_else(|| {
                VgError::new(
                    DiagnosticKind::NameError,
                    "`this` is only available inside methods and constructors",
                )
            }),
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                if !self.evaluate(left)?.is_truthy() {
                    return Ok(Value::boolean(false));
                }
                Ok(Value::boolean(self.evaluate(right)?.is_truthy()))
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                if self.evaluate(left)?.is_truthy() {
                    return Ok(Value::boolean(true));
                }
                Ok(Value::boolean(self.evaluate(right)?.is_truthy()))
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(*op, &left, &right)
            }
            ExprKind::Unary { op, expr } => {
                let value = self.evaluate(expr)?;
                unary(*op, &value)
            }
            ExprKind::Assign { target, value } => {
                let value = self.evaluate(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
            ExprKind::CompoundAssign { op, target, value } => {
                self.compound_assign(*op, target, value)
            }
            ExprKind::Call { callee, args } => {
                let target = match &callee.kind {
                    ExprKind::Variable(name) => self
                        .resolve_callable(name)
                        .map_err(|err| err.with_span(callee.span))?,
                    _ => self.evaluate(callee)?,
                };
                let args = self.evaluate_args(args)?;
                self.call_value(&target, args)
            }
            ExprKind::ArrayLiteral(elements) => {
                let values = self.evaluate_args(elements)?;
                Ok(Value::array(values))
            }
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                read_index(&target, &index)
            }
            ExprKind::Field { target, field } => {
                let owner = self.evaluate(target)?;
                self.member(&owner, field)
            }
            ExprKind::New { path, args } => {
                let class = self.resolve_path(path)?;
                let ValueKind::Class(class) = class.kind() else {
                    return Err(VgError::new(
                        DiagnosticKind::TypeError,
                        format!("`{}` is not a class", path.join(".")),
                    ));
                };
                let args = self.evaluate_args(args)?;
                self.instantiate(class, args)
            }
            ExprKind::FunctionRef { path, args } => {
                let target = self.resolve_path(path)?;
                if !target.is_callable() {
                    return Err(VgError::new(
                        DiagnosticKind::TypeError,
                        format!(
                            "cannot reference `{}`: a value of type {} is not callable",
                            path.join("."),
                            target.type_name()
                        ),
                    ));
                }
                let captured = self.evaluate_args(args)?;
                Ok(Value::new(ValueKind::FunctionReference { target, captured }))
            }
        }
    }

    fn evaluate_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.evaluate(arg)).collect()
    }

    fn literal(&self, literal: &Literal) -> Value {
        match literal {
            Literal::Integer(n) => Value::integer(*n),
            Literal::Double(n) => Value::double(*n),
            Literal::Bool(b) => Value::boolean(*b),
            Literal::String(s) => Value::string(s.clone()),
            Literal::Null => Value::null(),
        }
    }

    pub(crate) fn lookup_name(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.scopes.lookup(name)? {
            return Ok(value);
        }
        if let Some(library) = self.registry.get(name) {
            return Ok(Value::from(library));
        }
        Err(VgError::new(
            DiagnosticKind::NameError,
            format!("undefined variable `{name}`"),
        ))
    }

    fn resolve_callable(&self, name: &str) -> Result<Value> {
        self.scopes.lookup_callable(name)?.ok_or_else(|| {
            VgError::new(
                DiagnosticKind::NameError,
                format!("undefined function `{name}`"),
            )
        })
    }

    fn resolve_path(&mut self, path: &[String]) -> Result<Value> {
        let Some((first, rest)) = path.split_first() else {
            return Err(VgError::new(DiagnosticKind::NameError, "empty name"));
        };
        let mut value = if rest.is_empty() {
            match self.scopes.lookup_callable(first)? {
                Some(value) => value,
                None => self.lookup_name(first)?,
            }
        } else {
            self.lookup_name(first)?
        };
        for segment in rest {
            value = self.member(&value, segment)?;
        }
        Ok(value)
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<()> {
        match &target.kind {
            ExprKind::Variable(name) => self.scopes.assign(name, value),
            ExprKind::Field {
                target: owner_expr,
                field,
            } => {
                let owner = self.evaluate(owner_expr)?;
                self.assign_member(owner_expr, &owner, field, value)
            }
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                write_index(&target, &index, value)
            }
            _ => Err(VgError::new(
                DiagnosticKind::SyntaxError,
                "invalid assignment target",
            )),
        }
    }

    /// Reads and writes through one evaluation of the target's owner and
    /// index.
    fn compound_assign(&mut self, op: BinaryOp, target: &Expr, value: &Expr) -> Result<Value> {
        match &target.kind {
            ExprKind::Variable(name) => {
                let current = self.lookup_name(name)?;
                let updated = binary(op, &current, &self.evaluate(value)?)?;
                self.scopes.assign(name, updated.clone())?;
                Ok(updated)
            }
            ExprKind::Field {
                target: owner_expr,
                field,
            } => {
                let owner = self.evaluate(owner_expr)?;
                let current = self.member(&owner, field)?;
                let updated = binary(op, &current, &self.evaluate(value)?)?;
                self.assign_member(owner_expr, &owner, field, updated.clone())?;
                Ok(updated)
            }
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                let current = read_index(&target, &index)?;
                let updated = binary(op, &current, &self.evaluate(value)?)?;
                write_index(&target, &index, updated.clone())?;
                Ok(updated)
            }
            _ => Err(VgError::new(
                DiagnosticKind::SyntaxError,
                "invalid assignment target",
            )),
        }
    }

    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match callee.kind() {
            ValueKind::Native(native) => native.call(self, &args),
            ValueKind::Function(function) => self.call_function(function, args),
            ValueKind::FunctionReference { target, captured } => {
                let mut all = captured.clone();
                all.extend(args);
                self.call_value(target, all)
            }
            ValueKind::BoundMethod {
                receiver,
                class,
                method,
            } => self.invoke_method(class, method, Some(receiver.clone()), args),
            ValueKind::StaticMethod { class, method } => {
                self.invoke_method(class, method, None, args)
            }
            _ => Err(VgError::new(
                DiagnosticKind::TypeError,
                format!("a value of type {} is not callable", callee.type_name()),
            )),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> Result<Value> {
        let decl = &function.decl;
        check_arity(&decl.name, decl, args.len())?;
        trace!(function = %decl.name, args = args.len(), "call");
        let namespace = match &function.closure {
            Closure::Live => None,
            Closure::Namespace(namespace) => Some(Rc::clone(namespace)),
        };
        let mut scope = Scope::with_namespace(namespace);
        for (param, arg) in decl.params.iter().zip(args) {
            scope.define(param.as_str(), arg);
        }
        self.with_call_frame(scope, None, |interp| interp.run_body(&decl.body))
    }

    /// Runs a method or constructor body with `this` bound when there is a
    /// receiver. Private members are only callable from their own class.
    pub(crate) fn invoke_method(
        &mut self,
        class: &Rc<ClassDefinition>,
        method: &Method,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value> {
        let qualified = format!("{}.{}", class.name, method.decl.name);
        if method.private && !self.inside_class(class) {
            return Err(VgError::new(
                DiagnosticKind::AccessError,
                format!("`{qualified}` is private to class `{}`", class.name),
            ));
        }
        check_arity(&qualified, &method.decl, args.len())?;
        trace!(method = %qualified, args = args.len(), "call");
        let mut scope = Scope::with_namespace(class.namespace.clone());
        if let Some(receiver) = receiver {
            scope.define_const("this", receiver);
        }
        for (param, arg) in method.decl.params.iter().zip(args) {
            scope.define(param.as_str(), arg);
        }
        self.with_call_frame(scope, Some(Rc::clone(class)), |interp| {
            interp.run_body(&method.decl.body)
        })
    }

    fn run_body(&mut self, body: &[Stmt]) -> Result<Value> {
        match self.execute_block(body)? {
            FlowControl::Return(value) => Ok(value),
            FlowControl::Next | FlowControl::NextValue(_) => Ok(Value::null()),
            FlowControl::Break => Err(VgError::new(DiagnosticKind::Runtime, "`break` outside loop")),
            FlowControl::Continue => Err(VgError::new(
                DiagnosticKind::Runtime,
                "`continue` outside loop",
            )),
        }
    }

    pub(crate) fn inside_class(&self, class: &Rc<ClassDefinition>) -> bool {
        matches!(
            self.context.class_stack.last(),
            Some(Some(current)) if Rc::ptr_eq(current, class)
        )
    }

    pub(crate) fn with_scope<T>(
        &mut self,
        scope: Scope,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.scopes.push(scope);
        let result = body(self);
        self.scopes.pop();
        result
    }

    fn with_call_frame<T>(
        &mut self,
        scope: Scope,
        class: Option<Rc<ClassDefinition>>,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.context.call_depth >= self.max_call_depth {
            return Err(VgError::new(
                DiagnosticKind::Runtime,
                format!("maximum call depth of {} exceeded", self.max_call_depth),
            ));
        }
        self.context.call_depth += 1;
        self.context.class_stack.push(class);
        let result = self.with_scope(scope, body);
        self.context.class_stack.pop();
        self.context.call_depth -= 1;
        result
    }

    fn declare_function(&mut self, decl: &Rc<FunctionDecl>) {
        let function = Function {
            decl: Rc::clone(decl),
            closure: Closure::Live,
        };
        self.scopes
            .define_function(decl.name.clone(), Value::function(function));
    }

    fn notify(&mut self, kind: HookEventKind, span: SourceSpan) -> Result<()> {
        let Some(hook) = self.hook.as_mut() else {
            return Ok(());
        };
        let event = HookEvent {
            kind,
            line: span.line,
            column: span.column,
            depth: self.scopes.depth(),
            file: self.context.current_file.as_deref(),
        };
        if hook.on_event(&event) == HookControl::Interrupt {
            return Err(error_at(
                DiagnosticKind::Interrupted,
                "execution interrupted",
                span,
            ));
        }
        Ok(())
    }

    fn install_prelude(&mut self) {
        crate::stdlib::install(&mut self.scopes);
    }
}

pub(crate) enum FlowControl {
    Next,
    NextValue(Value),
    Return(Value),
    Break,
    Continue,
}

fn check_arity(name: &str, decl: &FunctionDecl, received: usize) -> Result<()> {
    let expected = decl.params.len();
    if expected != received {
        return Err(VgError::new(
            DiagnosticKind::ArityError,
            format!("`{name}` expected {expected} arguments but received {received}"),
        ));
    }
    Ok(())
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    use BinaryOp::*;
    match op {
        Equal => Ok(Value::boolean(left.equals(right))),
        NotEqual => Ok(Value::boolean(!left.equals(right))),
        Less | LessEqual | Greater | GreaterEqual => comparison(op, left, right),
        And => Ok(Value::boolean(left.is_truthy() && right.is_truthy())),
        Or => Ok(Value::boolean(left.is_truthy() || right.is_truthy())),
        Add | Sub | Mul | Div | Mod => arithmetic(op, left, right),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let is_array = |value: &Value| matches!(value.kind(), ValueKind::Array(_));
    if is_array(left) || is_array(right) {
        return Err(VgError::new(
            DiagnosticKind::TypeError,
            format!("operator `{}` cannot be applied to arrays", op.symbol()),
        ));
    }
    let is_string = |value: &Value| matches!(value.kind(), ValueKind::String(_));
    if is_string(left) || is_string(right) {
        if op == BinaryOp::Add {
            return Ok(Value::string(format!("{left}{right}")));
        }
        return Err(VgError::new(
            DiagnosticKind::TypeError,
            format!("operator `{}` cannot be applied to strings", op.symbol()),
        ));
    }
    if let (ValueKind::Integer(a), ValueKind::Integer(b)) = (left.kind(), right.kind()) {
        return integer_arithmetic(op, *a, *b);
    }
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => double_arithmetic(op, a, b),
        _ => Err(VgError::new(
            DiagnosticKind::TypeError,
            format!(
                "unsupported operand types for `{}`: {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
        )),
    }
}

fn division_by_zero(op: BinaryOp) -> VgError {
    let what = if op == BinaryOp::Mod { "modulo" } else { "division" };
    VgError::new(DiagnosticKind::ArithmeticError, format!("{what} by zero"))
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(division_by_zero(op)),
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Mod => a.wrapping_rem(b),
        other => return Err(not_arithmetic(other)),
    };
    Ok(Value::integer(value))
}

fn double_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err(division_by_zero(op)),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        other => return Err(not_arithmetic(other)),
    };
    Ok(Value::double(value))
}

fn not_arithmetic(op: BinaryOp) -> VgError {
    VgError::new(
        DiagnosticKind::Runtime,
        format!("`{}` is not an arithmetic operator", op.symbol()),
    )
}

fn comparison(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> bool {
        match op {
            BinaryOp::Less => a < b,
            BinaryOp::LessEqual => a <= b,
            BinaryOp::Greater => a > b,
            _ => a >= b,
        }
    }

    if let (ValueKind::Integer(a), ValueKind::Integer(b)) = (left.kind(), right.kind()) {
        return Ok(Value::boolean(compare(op, a, b)));
    }
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok(Value::boolean(compare(op, a, b))),
        _ => Err(VgError::new(
            DiagnosticKind::TypeError,
            format!(
                "operator `{}` expects numbers, found {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
        )),
    }
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value> {
    match (op, value.kind()) {
        (UnaryOp::Not, _) => Ok(Value::boolean(!value.is_truthy())),
        (UnaryOp::Negate, ValueKind::Integer(n)) => Ok(Value::integer(n.wrapping_neg())),
        (UnaryOp::Negate, ValueKind::Double(n)) => Ok(Value::double(-n)),
        (UnaryOp::Plus, ValueKind::Integer(_) | ValueKind::Double(_)) => Ok(value.clone()),
        (UnaryOp::Negate | UnaryOp::Plus, _) => Err(VgError::new(
            DiagnosticKind::TypeError,
            format!(
                "unary `{}` expects a number, found {}",
                if op == UnaryOp::Negate { "-" } else { "+" },
                value.type_name()
            ),
        )),
    }
}

fn array_position(index: &Value, len: usize) -> Result<usize> {
    let ValueKind::Integer(idx) = index.kind() else {
        return Err(VgError::new(
            DiagnosticKind::TypeError,
            format!("array index must be an Integer, found {}", index.type_name()),
        ));
    };
    usize::try_from(*idx)
        .ok()
        .filter(|position| *position < len)
        .ok_or_else(|| {
            VgError::new(
                DiagnosticKind::RangeError,
                format!("index {idx} out of bounds for array of length {len}"),
            )
        })
}

fn not_indexable(target: &Value) -> VgError {
    VgError::new(
        DiagnosticKind::TypeError,
        format!("cannot index into a value of type {}", target.type_name()),
    )
}

fn read_index(target: &Value, index: &Value) -> Result<Value> {
    let ValueKind::Array(values) = target.kind() else {
        return Err(not_indexable(target));
    };
    let values = values.borrow();
    let position = array_position(index, values.len())?;
    Ok(values[position].clone())
}

fn write_index(target: &Value, index: &Value, value: Value) -> Result<()> {
    let ValueKind::Array(values) = target.kind() else {
        return Err(not_indexable(target));
    };
    let mut values = values.borrow_mut();
    let position = array_position(index, values.len())?;
    values[position] = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_by_zero_is_an_arithmetic_error() {
        let err = binary(BinaryOp::Div, &Value::integer(1), &Value::integer(0)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::ArithmeticError);
        let err = binary(BinaryOp::Mod, &Value::double(1.0), &Value::integer(0)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::ArithmeticError);
    }

    #[test]
    fn integer_overflow_wraps() {
        let value = binary(BinaryOp::Add, &Value::integer(i64::MAX), &Value::integer(1)).unwrap();
        assert_eq!(value.to_string(), i64::MIN.to_string());
    }

    #[test]
    fn mixed_arithmetic_produces_doubles() {
        let value = binary(BinaryOp::Add, &Value::integer(1), &Value::double(0.5)).unwrap();
        assert_eq!(value.to_string(), "1.5");
        let value = binary(BinaryOp::Div, &Value::integer(7), &Value::integer(2)).unwrap();
        assert_eq!(value.to_string(), "3");
    }

    #[test]
    fn strings_concatenate_with_anything() {
        let value = binary(BinaryOp::Add, &Value::string("n="), &Value::integer(4)).unwrap();
        assert_eq!(value.to_string(), "n=4");
        let err = binary(BinaryOp::Sub, &Value::string("a"), &Value::integer(1)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::TypeError);
    }

    #[test]
    fn arrays_reject_arithmetic() {
        let array = Value::array(vec![Value::integer(1)]);
        let err = binary(BinaryOp::Add, &array, &Value::string("x")).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::TypeError);
    }

    #[test]
    fn negative_and_out_of_range_indices_are_range_errors() {
        let array = Value::array(vec![Value::integer(1)]);
        let err = read_index(&array, &Value::integer(-1)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::RangeError);
        let err = read_index(&array, &Value::integer(1)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::RangeError);
        let err = read_index(&array, &Value::string("0")).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::TypeError);
    }
}

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{DiagnosticKind, Result, VgError},
    object::{
        ClassDefinition, EnumDefinition, Function, Instance, Library, Method, Namespace,
        StructDefinition, StructValue,
    },
    runtime::Interpreter,
};

#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueKind::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::new(ValueKind::Integer(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(ValueKind::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::new(ValueKind::Array(RefCell::new(values)))
    }

    pub fn function(function: Function) -> Self {
        Self::new(ValueKind::Function(Rc::new(function)))
    }

    pub fn class(class: Rc<ClassDefinition>) -> Self {
        Self::new(ValueKind::Class(class))
    }

    pub fn namespace(namespace: Rc<Namespace>) -> Self {
        Self::new(ValueKind::Namespace(namespace))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.0, ValueKind::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            ValueKind::Null => false,
            ValueKind::Boolean(b) => *b,
            ValueKind::Integer(n) => *n != 0,
            ValueKind::Double(n) => *n != 0.0,
            ValueKind::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            &*self.0,
            ValueKind::Function(_)
                | ValueKind::FunctionReference { .. }
                | ValueKind::BoundMethod { .. }
                | ValueKind::StaticMethod { .. }
                | ValueKind::Native(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Null => "Null",
            ValueKind::Boolean(_) => "Boolean",
            ValueKind::Integer(_) => "Integer",
            ValueKind::Double(_) => "Double",
            ValueKind::String(_) => "String",
            ValueKind::Array(_) => "Array",
            ValueKind::Struct(_) => "Struct",
            ValueKind::StructDefinition(_) => "StructDefinition",
            ValueKind::Instance(_) => "ClassInstance",
            ValueKind::Class(_) => "Class",
            ValueKind::Function(_) => "Function",
            ValueKind::FunctionReference { .. } => "FunctionReference",
            ValueKind::BoundMethod { .. } => "Method",
            ValueKind::StaticMethod { .. } => "StaticMethod",
            ValueKind::Native(_) => "NativeFunction",
            ValueKind::Namespace(_) => "Namespace",
            ValueKind::Library(_) => "Library",
            ValueKind::Enum(_) => "Enum",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Integer(n) => Some(*n as f64),
            ValueKind::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Structural equality: numbers compare by value across Integer and
    /// Double, arrays and structs element-wise, everything else by identity.
    /// A pair of aggregates met again while comparing counts as equal.
    pub fn equals(&self, other: &Value) -> bool {
        self.equals_within(other, &mut Vec::new())
    }

    fn equals_within(
        &self,
        other: &Value,
        pending: &mut Vec<(*const ValueKind, *const ValueKind)>,
    ) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        let pair = (Rc::as_ptr(&self.0), Rc::as_ptr(&other.0));
        match (&*self.0, &*other.0) {
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a == b,
            (ValueKind::Integer(a), ValueKind::Integer(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::Array(a), ValueKind::Array(b)) => {
                if pending.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return false;
                }
                pending.push(pair);
                let equal = a.iter().zip(b.iter()).all(|(l, r)| l.equals_within(r, pending));
                pending.pop();
                equal
            }
            (ValueKind::Struct(a), ValueKind::Struct(b)) => {
                if !Rc::ptr_eq(&a.definition, &b.definition) {
                    return false;
                }
                if pending.contains(&pair) {
                    return true;
                }
                let (left, right) = (a.fields.borrow(), b.fields.borrow());
                pending.push(pair);
                let equal = left
                    .values()
                    .zip(right.values())
                    .all(|(l, r)| l.equals_within(r, pending));
                pending.pop();
                equal
            }
            (ValueKind::StructDefinition(a), ValueKind::StructDefinition(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Class(a), ValueKind::Class(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Function(a), ValueKind::Function(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Namespace(a), ValueKind::Namespace(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Library(a), ValueKind::Library(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Enum(a), ValueKind::Enum(b)) => Rc::ptr_eq(a, b),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Copy used for per-instance field defaults: arrays and structs are
    /// duplicated recursively, every other value is shared. Self-references
    /// point into the copy.
    pub fn deep_copy(&self) -> Value {
        self.copy_within(&mut Vec::new())
    }

    fn copy_within(&self, copies: &mut Vec<(*const ValueKind, Value)>) -> Value {
        let key = Rc::as_ptr(&self.0);
        if let Some((_, copy)) = copies.iter().find(|(original, _)| *original == key) {
            return copy.clone();
        }
        match &*self.0 {
            ValueKind::Array(values) => {
                let copy = Value::array(Vec::new());
                copies.push((key, copy.clone()));
                let items: Vec<Value> = values
                    .borrow()
                    .iter()
                    .map(|value| value.copy_within(copies))
                    .collect();
                if let ValueKind::Array(target) = copy.kind() {
                    *target.borrow_mut() = items;
                }
                copy
            }
            ValueKind::Struct(value) => {
                let copy = Value::new(ValueKind::Struct(StructValue {
                    definition: Rc::clone(&value.definition),
                    fields: RefCell::new(Fields::new()),
                }));
                copies.push((key, copy.clone()));
                let fields: Fields = value
                    .fields
                    .borrow()
                    .iter()
                    .map(|(name, field)| (name.clone(), field.copy_within(copies)))
                    .collect();
                if let ValueKind::Struct(target) = copy.kind() {
                    *target.fields.borrow_mut() = fields;
                }
                copy
            }
            _ => self.clone(),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, open: &mut Vec<*const ValueKind>) -> fmt::Result {
        let key = Rc::as_ptr(&self.0);
        match &*self.0 {
            ValueKind::Array(values) => {
                if open.contains(&key) {
                    return write!(f, "[...]");
                }
                open.push(key);
                write!(f, "[")?;
                for (idx, value) in values.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    value.render(f, open)?;
                }
                open.pop();
                write!(f, "]")
            }
            ValueKind::Struct(value) => {
                if open.contains(&key) {
                    return write!(f, "{}{{...}}", value.definition.name);
                }
                open.push(key);
                write!(f, "{}{{", value.definition.name)?;
                for (idx, (name, field)) in value.fields.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}=")?;
                    field.render(f, open)?;
                }
                open.pop();
                write!(f, "}}")
            }
            _ => write!(f, "{self}"),
        }
    }
}

pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => write!(f, "{s:?}"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Boolean(b) => write!(f, "{b}"),
            ValueKind::Integer(n) => write!(f, "{n}"),
            ValueKind::Double(n) => write!(f, "{}", format_double(*n)),
            ValueKind::String(s) => write!(f, "{s}"),
            ValueKind::Array(_) | ValueKind::Struct(_) => self.render(f, &mut Vec::new()),
            ValueKind::StructDefinition(def) => write!(f, "<struct {}>", def.name),
            ValueKind::Instance(instance) => write!(f, "<{} instance>", instance.class.name),
            ValueKind::Class(class) => write!(f, "<class {}>", class.name),
            ValueKind::Function(fun) => write!(f, "<function {}>", fun.decl.name),
            ValueKind::FunctionReference { target, .. } => write!(f, "<reference to {target}>"),
            ValueKind::BoundMethod { class, method, .. } => {
                write!(f, "<method {}.{}>", class.name, method.decl.name)
            }
            ValueKind::StaticMethod { class, method } => {
                write!(f, "<static method {}.{}>", class.name, method.decl.name)
            }
            ValueKind::Native(fun) => write!(f, "<native function {}>", fun.name),
            ValueKind::Namespace(ns) => write!(f, "<namespace {}>", ns.path),
            ValueKind::Library(lib) => write!(f, "<library {}>", lib.name),
            ValueKind::Enum(def) => write!(f, "<enum {}>", def.name),
        }
    }
}

pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Array(RefCell<Vec<Value>>),
    Struct(StructValue),
    StructDefinition(Rc<StructDefinition>),
    Instance(Instance),
    Class(Rc<ClassDefinition>),
    Function(Rc<Function>),
    FunctionReference {
        target: Value,
        captured: Vec<Value>,
    },
    BoundMethod {
        receiver: Value,
        class: Rc<ClassDefinition>,
        method: Method,
    },
    StaticMethod {
        class: Rc<ClassDefinition>,
        method: Method,
    },
    Native(NativeFunction),
    Namespace(Rc<Namespace>),
    Library(Rc<Library>),
    Enum(Rc<EnumDefinition>),
}

pub type NativeCallback = fn(&mut Interpreter, &[Value]) -> Result<Value>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub callback: NativeCallback,
}

impl NativeFunction {
    pub const VARIADIC: usize = usize::MAX;

    pub fn call(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        if self.arity != Self::VARIADIC && args.len() != self.arity {
            return Err(VgError::new(
                DiagnosticKind::ArityError,
                format!(
                    "function `{}` expected {} arguments but received {}",
                    self.name,
                    self.arity,
                    args.len()
                ),
            ));
        }
        (self.callback)(interpreter, args)
    }
}

pub type Fields = IndexMap<String, Value>;

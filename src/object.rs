use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    ast::{FunctionDecl, Modifiers},
    diagnostics::{DiagnosticKind, Result, VgError},
    value::{Fields, Value, ValueKind},
};

/// Where a function resolves names that are not bound in its own frame.
pub enum Closure {
    Live,
    Namespace(Rc<Namespace>),
}

pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub closure: Closure,
}

#[derive(Clone)]
pub struct Method {
    pub decl: Rc<FunctionDecl>,
    pub private: bool,
}

impl Method {
    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }
}

pub struct FieldInfo {
    pub default: Value,
    pub modifiers: Modifiers,
}

pub struct StaticField {
    pub value: Value,
    pub modifiers: Modifiers,
}

pub struct ClassDefinition {
    pub name: String,
    pub superclass: Option<Rc<ClassDefinition>>,
    pub fields: IndexMap<String, FieldInfo>,
    pub statics: RefCell<IndexMap<String, StaticField>>,
    pub methods: IndexMap<String, Method>,
    pub static_methods: IndexMap<String, Method>,
    pub constructors: Vec<Method>,
    pub namespace: Option<Rc<Namespace>>,
}

impl ClassDefinition {
    fn lineage(self: &Rc<Self>) -> impl Iterator<Item = Rc<ClassDefinition>> {
        std::iter::successors(Some(Rc::clone(self)), |class| class.superclass.clone())
    }

    /// Instance method lookup, walking up the superclass chain only when the
    /// class itself lacks the name. Returns the declaring class as well.
    pub fn find_method(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassDefinition>, Method)> {
        self.lineage()
            .find_map(|class| class.methods.get(name).cloned().map(|m| (Rc::clone(&class), m)))
    }

    pub fn find_static_method(
        self: &Rc<Self>,
        name: &str,
    ) -> Option<(Rc<ClassDefinition>, Method)> {
        self.lineage().find_map(|class| {
            class
                .static_methods
                .get(name)
                .cloned()
                .map(|m| (Rc::clone(&class), m))
        })
    }

    pub fn find_field(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassDefinition>, Modifiers)> {
        self.lineage()
            .find_map(|class| class.fields.get(name).map(|f| (Rc::clone(&class), f.modifiers)))
    }

    pub fn find_static_field(
        self: &Rc<Self>,
        name: &str,
    ) -> Option<(Rc<ClassDefinition>, Value, Modifiers)> {
        self.lineage().find_map(|class| {
            let found = class
                .statics
                .borrow()
                .get(name)
                .map(|field| (field.value.clone(), field.modifiers));
            found.map(|(value, modifiers)| (class, value, modifiers))
        })
    }

    pub fn set_static(&self, name: &str, value: Value) -> Result<()> {
        let mut statics = self.statics.borrow_mut();
        let Some(field) = statics.get_mut(name) else {
            return Err(VgError::new(
                DiagnosticKind::NameError,
                format!("class `{}` has no static field `{name}`", self.name),
            ));
        };
        if field.modifiers.constant {
            return Err(VgError::new(
                DiagnosticKind::ConstError,
                format!("cannot assign to constant field `{}.{name}`", self.name),
            ));
        }
        field.value = value;
        Ok(())
    }

    pub fn constructor(&self, arity: usize) -> Option<&Method> {
        self.constructors.iter().find(|ctor| ctor.arity() == arity)
    }

    /// Fresh field map for a new instance: ancestor defaults first, each
    /// subclass overriding what it redeclares.
    pub fn instance_fields(&self) -> Fields {
        let mut fields = match &self.superclass {
            Some(parent) => parent.instance_fields(),
            None => Fields::new(),
        };
        for (name, info) in &self.fields {
            fields.insert(name.clone(), info.default.deep_copy());
        }
        fields
    }
}

pub struct Instance {
    pub class: Rc<ClassDefinition>,
    pub fields: RefCell<Fields>,
    pub initialized: Cell<bool>,
}

impl Instance {
    pub fn new(class: Rc<ClassDefinition>) -> Self {
        let fields = class.instance_fields();
        Self {
            class,
            fields: RefCell::new(fields),
            initialized: Cell::new(false),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    /// Writes a declared field; constant fields only accept writes while the
    /// constructor is still running.
    pub fn set(&self, name: &str, value: Value, modifiers: Modifiers) -> Result<()> {
        if modifiers.constant && self.initialized.get() {
            return Err(VgError::new(
                DiagnosticKind::ConstError,
                format!(
                    "cannot assign to constant field `{name}` of `{}`",
                    self.class.name
                ),
            ));
        }
        let mut fields = self.fields.borrow_mut();
        match fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VgError::new(
                DiagnosticKind::NameError,
                format!("class `{}` has no field `{name}`", self.class.name),
            )),
        }
    }
}

pub struct StructDefinition {
    pub name: String,
    pub fields: Fields,
}

impl StructDefinition {
    pub fn instantiate(self: &Rc<Self>) -> StructValue {
        StructValue {
            definition: Rc::clone(self),
            fields: RefCell::new(
                self.fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.deep_copy()))
                    .collect(),
            ),
        }
    }
}

pub struct StructValue {
    pub definition: Rc<StructDefinition>,
    pub fields: RefCell<Fields>,
}

impl StructValue {
    pub fn get(&self, name: &str) -> Result<Value> {
        self.fields.borrow().get(name).cloned().ok_or_else(|| {
            VgError::new(
                DiagnosticKind::NameError,
                format!("struct `{}` has no field `{name}`", self.definition.name),
            )
        })
    }

    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        match self.fields.borrow_mut().get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VgError::new(
                DiagnosticKind::NameError,
                format!("struct `{}` has no field `{name}`", self.definition.name),
            )),
        }
    }
}

pub struct EnumDefinition {
    pub name: String,
    pub values: Fields,
}

#[derive(Clone)]
pub struct NamespaceSymbol {
    pub value: Value,
    pub constant: bool,
}

pub struct Namespace {
    pub name: String,
    pub path: String,
    pub symbols: RefCell<IndexMap<String, NamespaceSymbol>>,
    pub children: RefCell<IndexMap<String, Rc<Namespace>>>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            symbols: RefCell::new(IndexMap::new()),
            children: RefCell::new(IndexMap::new()),
        }
    }

    pub fn define(&self, name: impl Into<String>, value: Value, constant: bool) {
        self.symbols
            .borrow_mut()
            .insert(name.into(), NamespaceSymbol { value, constant });
    }

    pub fn add_child(&self, child: Rc<Namespace>) {
        self.children
            .borrow_mut()
            .insert(child.name.clone(), child);
    }

    pub fn child(&self, name: &str) -> Option<Rc<Namespace>> {
        self.children.borrow().get(name).cloned()
    }

    pub fn symbol(&self, name: &str) -> Option<NamespaceSymbol> {
        self.symbols.borrow().get(name).cloned()
    }

    pub fn member(&self, name: &str) -> Option<Value> {
        self.symbol(name)
            .map(|symbol| symbol.value)
            .or_else(|| self.child(name).map(Value::namespace))
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<()> {
        let mut symbols = self.symbols.borrow_mut();
        match symbols.get_mut(name) {
            Some(symbol) if symbol.constant => Err(VgError::new(
                DiagnosticKind::ConstError,
                format!("cannot assign to constant `{}.{name}`", self.path),
            )),
            Some(symbol) => {
                symbol.value = value;
                Ok(())
            }
            None => Err(VgError::new(
                DiagnosticKind::NameError,
                format!("namespace `{}` has no member `{name}`", self.path),
            )),
        }
    }
}

pub struct Library {
    pub name: String,
    pub namespaces: IndexMap<String, Rc<Namespace>>,
}

impl Library {
    pub fn namespace(&self, name: &str) -> Option<Rc<Namespace>> {
        self.namespaces.get(name).cloned()
    }
}

impl From<Rc<Library>> for Value {
    fn from(library: Rc<Library>) -> Self {
        Value::new(ValueKind::Library(library))
    }
}

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    ast::{ClassDecl, EnumMember, Expr, ExprKind, MethodDecl, StructField},
    diagnostics::{DiagnosticKind, Result, VgError},
    object::{
        ClassDefinition, EnumDefinition, FieldInfo, Instance, Method, Namespace, StaticField,
        StructDefinition,
    },
    runtime::Interpreter,
    scope::Scope,
    value::{Fields, Value, ValueKind},
};

impl Interpreter {
    pub(crate) fn declare_class(
        &mut self,
        decl: &ClassDecl,
        namespace: Option<&Rc<Namespace>>,
    ) -> Result<Rc<ClassDefinition>> {
        let class = self.with_scope(Scope::with_namespace(namespace.cloned()), |interp| {
            interp.build_class(decl, namespace)
        })?;
        let value = Value::class(Rc::clone(&class));
        match namespace {
            Some(namespace) => namespace.define(decl.name.clone(), value, false),
            None => self.scopes.define(decl.name.as_str(), value),
        }
        debug!(
            class = %decl.name,
            superclass = ?decl.superclass,
            methods = decl.methods.len(),
            "declared class"
        );
        Ok(class)
    }

    fn build_class(
        &mut self,
        decl: &ClassDecl,
        namespace: Option<&Rc<Namespace>>,
    ) -> Result<Rc<ClassDefinition>> {
        let superclass = match &decl.superclass {
            Some(name) => Some(self.resolve_superclass(&decl.name, name)?),
            None => None,
        };

        let mut fields = IndexMap::new();
        let mut statics = IndexMap::new();
        for field in &decl.fields {
            let value = match &field.default {
                Some(expr) => self.evaluate(expr)?,
                None => Value::null(),
            };
            if field.modifiers.is_static {
                statics.insert(
                    field.name.clone(),
                    StaticField {
                        value,
                        modifiers: field.modifiers,
                    },
                );
            } else {
                fields.insert(
                    field.name.clone(),
                    FieldInfo {
                        default: value,
                        modifiers: field.modifiers,
                    },
                );
            }
        }

        let mut methods = IndexMap::new();
        let mut static_methods = IndexMap::new();
        for member in &decl.methods {
            let target = if member.modifiers.is_static {
                &mut static_methods
            } else {
                &mut methods
            };
            target.insert(member.function.name.clone(), method(member));
        }

        let mut constructors: Vec<Method> = Vec::new();
        for ctor in &decl.constructors {
            let ctor = method(ctor);
            if constructors.iter().any(|other| other.arity() == ctor.arity()) {
                return Err(VgError::new(
                    DiagnosticKind::SyntaxError,
                    format!(
                        "class `{}` declares more than one constructor taking {} arguments",
                        decl.name,
                        ctor.arity()
                    ),
                )
                .with_span(ctor.decl.span));
            }
            constructors.push(ctor);
        }

        Ok(Rc::new(ClassDefinition {
            name: decl.name.clone(),
            superclass,
            fields,
            statics: RefCell::new(statics),
            methods,
            static_methods,
            constructors,
            namespace: namespace.cloned(),
        }))
    }

    fn resolve_superclass(&self, class: &str, name: &str) -> Result<Rc<ClassDefinition>> {
        let value = self.lookup_name(name).map_err(|err| {
            if err.kind() == DiagnosticKind::NameError {
                VgError::new(
                    DiagnosticKind::NameError,
                    format!("superclass `{name}` of `{class}` is not defined"),
                )
            } else {
                err
            }
        })?;
        match value.kind() {
            ValueKind::Class(parent) => Ok(Rc::clone(parent)),
            _ => Err(VgError::new(
                DiagnosticKind::TypeError,
                format!("`{class}` cannot extend `{name}`, a value of type {}", value.type_name()),
            )),
        }
    }

    /// Defaults are evaluated once, here; every instance gets a deep copy.
    pub(crate) fn declare_struct(&mut self, name: &str, fields: &[StructField]) -> Result<()> {
        let mut defaults = Fields::new();
        for field in fields {
            let value = match &field.default {
                Some(expr) => self.evaluate(expr)?,
                None => Value::null(),
            };
            defaults.insert(field.name.clone(), value);
        }
        let definition = StructDefinition {
            name: name.to_string(),
            fields: defaults,
        };
        self.scopes.define(
            name,
            Value::new(ValueKind::StructDefinition(Rc::new(definition))),
        );
        Ok(())
    }

    pub(crate) fn declare_enum(&mut self, name: &str, members: &[EnumMember]) -> Result<()> {
        let mut values = Fields::new();
        let mut next = 0i64;
        for member in members {
            let value = match &member.value {
                Some(expr) => self.evaluate(expr)?,
                None => Value::integer(next),
            };
            match value.kind() {
                ValueKind::Integer(n) => next = n.wrapping_add(1),
                _ => next = next.wrapping_add(1),
            }
            values.insert(member.name.clone(), value);
        }
        let definition = EnumDefinition {
            name: name.to_string(),
            values,
        };
        self.scopes
            .define(name, Value::new(ValueKind::Enum(Rc::new(definition))));
        Ok(())
    }

    pub(crate) fn instantiate(
        &mut self,
        class: &Rc<ClassDefinition>,
        args: Vec<Value>,
    ) -> Result<Value> {
        let ctor = match class.constructor(args.len()) {
            Some(ctor) => Some(ctor.clone()),
            None if class.constructors.is_empty() && args.is_empty() => None,
            None => {
                return Err(VgError::new(
                    DiagnosticKind::ArityError,
                    format!(
                        "class `{}` has no constructor taking {} arguments",
                        class.name,
                        args.len()
                    ),
                ));
            }
        };
        let instance = Value::new(ValueKind::Instance(Instance::new(Rc::clone(class))));
        if let Some(ctor) = ctor {
            self.invoke_method(class, &ctor, Some(instance.clone()), args)?;
        }
        if let ValueKind::Instance(created) = instance.kind() {
            created.initialized.set(true);
        }
        Ok(instance)
    }

    pub(crate) fn member(&mut self, owner: &Value, name: &str) -> Result<Value> {
        match owner.kind() {
            ValueKind::Namespace(namespace) => namespace.member(name).ok_or_else(|| {
                VgError::new(
                    DiagnosticKind::NameError,
                    format!("namespace `{}` has no member `{name}`", namespace.path),
                )
            }),
            ValueKind::Library(library) => library
                .namespace(name)
                .map(Value::namespace)
                .ok_or_else(|| {
                    VgError::new(
                        DiagnosticKind::NameError,
                        format!("library `{}` has no namespace `{name}`", library.name),
                    )
                }),
            // Reading through a bare definition sees the declared defaults.
            ValueKind::StructDefinition(definition) => {
                let created = definition.instantiate();
                if name == "createInstance" && !definition.fields.contains_key(name) {
                    return Ok(Value::new(ValueKind::Struct(created)));
                }
                created.get(name)
            }
            ValueKind::Struct(value) => value.get(name),
            ValueKind::Instance(instance) => self.instance_member(owner, instance, name),
            ValueKind::Class(class) => self.static_member(class, name),
            ValueKind::Enum(definition) => definition.values.get(name).cloned().ok_or_else(|| {
                VgError::new(
                    DiagnosticKind::NameError,
                    format!("enum `{}` has no member `{name}`", definition.name),
                )
            }),
            _ => Err(VgError::new(
                DiagnosticKind::TypeError,
                format!(
                    "cannot access member `{name}` on a value of type {}",
                    owner.type_name()
                ),
            )),
        }
    }

    fn instance_member(&self, receiver: &Value, instance: &Instance, name: &str) -> Result<Value> {
        if let Some((owner, modifiers)) = instance.class.find_field(name) {
            if modifiers.private && !self.inside_class(&owner) {
                return Err(private_member(&owner, name));
            }
            return instance.get(name).ok_or_else(|| no_member(&instance.class, name));
        }
        if let Some((owner, method)) = instance.class.find_method(name) {
            return Ok(Value::new(ValueKind::BoundMethod {
                receiver: receiver.clone(),
                class: owner,
                method,
            }));
        }
        self.static_member(&instance.class, name)
    }

    fn static_member(&self, class: &Rc<ClassDefinition>, name: &str) -> Result<Value> {
        if let Some((owner, value, modifiers)) = class.find_static_field(name) {
            if modifiers.private && !self.inside_class(&owner) {
                return Err(private_member(&owner, name));
            }
            return Ok(value);
        }
        if let Some((owner, method)) = class.find_static_method(name) {
            return Ok(Value::new(ValueKind::StaticMethod {
                class: owner,
                method,
            }));
        }
        Err(no_member(class, name))
    }

    /// `owner.field = value`. A struct definition held in a variable is
    /// materialized into a struct value that replaces the variable's binding.
    pub(crate) fn assign_member(
        &mut self,
        owner_expr: &Expr,
        owner: &Value,
        field: &str,
        value: Value,
    ) -> Result<()> {
        match owner.kind() {
            ValueKind::StructDefinition(definition) => {
                let created = definition.instantiate();
                created.set(field, value)?;
                if let ExprKind::Variable(name) = &owner_expr.kind {
                    self.scopes
                        .assign(name, Value::new(ValueKind::Struct(created)))?;
                }
                Ok(())
            }
            ValueKind::Struct(target) => target.set(field, value),
            ValueKind::Instance(instance) => self.set_instance_field(instance, field, value),
            ValueKind::Class(class) => self.set_static_field(class, field, value),
            ValueKind::Namespace(namespace) => namespace.assign(field, value),
            _ => Err(VgError::new(
                DiagnosticKind::TypeError,
                format!(
                    "cannot assign member `{field}` on a value of type {}",
                    owner.type_name()
                ),
            )),
        }
    }

    fn set_instance_field(&self, instance: &Instance, name: &str, value: Value) -> Result<()> {
        match instance.class.find_field(name) {
            Some((owner, modifiers)) => {
                if modifiers.private && !self.inside_class(&owner) {
                    return Err(private_member(&owner, name));
                }
                instance.set(name, value, modifiers)
            }
            None => self.set_static_field(&instance.class, name, value),
        }
    }

    fn set_static_field(&self, class: &Rc<ClassDefinition>, name: &str, value: Value) -> Result<()> {
        let Some((owner, _, modifiers)) = class.find_static_field(name) else {
            return Err(VgError::new(
                DiagnosticKind::NameError,
                format!("class `{}` has no field `{name}`", class.name),
            ));
        };
        if modifiers.private && !self.inside_class(&owner) {
            return Err(private_member(&owner, name));
        }
        owner.set_static(name, value)
    }
}

fn method(decl: &MethodDecl) -> Method {
    Method {
        decl: Rc::clone(&decl.function),
        private: decl.modifiers.private,
    }
}

fn private_member(owner: &ClassDefinition, name: &str) -> VgError {
    VgError::new(
        DiagnosticKind::AccessError,
        format!("`{}.{name}` is private to class `{}`", owner.name, owner.name),
    )
}

fn no_member(class: &ClassDefinition, name: &str) -> VgError {
    VgError::new(
        DiagnosticKind::NameError,
        format!("class `{}` has no member `{name}`", class.name),
    )
}

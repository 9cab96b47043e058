use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    diagnostics::{DiagnosticKind, Result, VgError},
    object::Namespace,
    value::Value,
};

#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub constant: bool,
    pub origin: Option<String>,
    /// Set when two different imports bound the same name.
    pub ambiguous: bool,
}

impl Binding {
    fn local(value: Value, constant: bool) -> Self {
        Self {
            value,
            constant,
            origin: None,
            ambiguous: false,
        }
    }
}

#[derive(Default)]
pub struct Scope {
    variables: IndexMap<String, Binding>,
    functions: IndexMap<String, Value>,
    namespace: Option<Rc<Namespace>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(namespace: Option<Rc<Namespace>>) -> Self {
        Self {
            namespace,
            ..Self::default()
        }
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.variables
            .insert(name.into(), Binding::local(value, false));
    }

    pub fn define_const(&mut self, name: impl Into<String>, value: Value) {
        self.variables
            .insert(name.into(), Binding::local(value, true));
    }

    fn ambiguity_error(name: &str, binding: &Binding) -> VgError {
        VgError::new(
            DiagnosticKind::ImportError,
            format!(
                "`{name}` is ambiguous between wildcard imports (last from `{}`); qualify it with its namespace",
                binding.origin.as_deref().unwrap_or("<local>")
            ),
        )
    }

    fn namespace_symbol(&self, name: &str) -> Option<Value> {
        self.namespace.as_ref().and_then(|ns| ns.member(name))
    }
}

pub struct ScopeStack {
    frames: Vec<Scope>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Scope::new()],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, scope: Scope) {
        self.frames.push(scope);
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn current(&mut self) -> &mut Scope {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.current().define(name, value);
    }

    pub fn define_const(&mut self, name: impl Into<String>, value: Value) {
        self.current().define_const(name, value);
    }

    pub fn define_function(&mut self, name: impl Into<String>, value: Value) {
        self.current().functions.insert(name.into(), value);
    }

    /// Binds an imported symbol in the current frame, replacing whatever the
    /// frame held under that name.
    pub fn define_imported(&mut self, name: &str, value: Value, origin: &str, constant: bool) {
        self.current().variables.insert(
            name.to_string(),
            Binding {
                value,
                constant,
                origin: Some(origin.to_string()),
                ambiguous: false,
            },
        );
    }

    /// Binds a wildcard-imported symbol. A name already present under a
    /// different origin (or as a local binding) becomes ambiguous.
    pub fn define_with_origin(&mut self, name: &str, value: Value, origin: &str, constant: bool) {
        let frame = self.current();
        match frame.variables.get_mut(name) {
            Some(existing) if existing.origin.as_deref() == Some(origin) => {
                existing.value = value;
                existing.constant = constant;
            }
            Some(existing) => {
                existing.ambiguous = true;
                existing.origin = Some(origin.to_string());
            }
            None => {
                frame.variables.insert(
                    name.to_string(),
                    Binding {
                        value,
                        constant,
                        origin: Some(origin.to_string()),
                        ambiguous: false,
                    },
                );
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Option<Value>> {
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.variables.get(name) {
                if binding.ambiguous {
                    return Err(Scope::ambiguity_error(name, binding));
                }
                return Ok(Some(binding.value.clone()));
            }
            if let Some(value) = frame.namespace_symbol(name) {
                return Ok(Some(value));
            }
        }
        Ok(self.lookup_function(name))
    }

    fn lookup_function(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.functions.get(name).cloned())
    }

    /// Resolves the target of a call by bare name: per frame, the function
    /// table is checked before the variables.
    pub fn lookup_callable(&self, name: &str) -> Result<Option<Value>> {
        for frame in self.frames.iter().rev() {
            if let Some(function) = frame.functions.get(name) {
                return Ok(Some(function.clone()));
            }
            if let Some(binding) = frame.variables.get(name) {
                if binding.ambiguous {
                    return Err(Scope::ambiguity_error(name, binding));
                }
                return Ok(Some(binding.value.clone()));
            }
            if let Some(value) = frame.namespace_symbol(name) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|frame| {
            frame.variables.contains_key(name)
                || frame
                    .namespace
                    .as_ref()
                    .is_some_and(|ns| ns.symbol(name).is_some())
        })
    }

    pub fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        for frame in self.frames.iter_mut().rev() {
            if let Some(binding) = frame.variables.get_mut(name) {
                if binding.ambiguous {
                    return Err(Scope::ambiguity_error(name, binding));
                }
                if binding.constant {
                    return Err(VgError::new(
                        DiagnosticKind::ConstError,
                        format!("cannot assign to constant `{name}`"),
                    ));
                }
                binding.value = value;
                return Ok(());
            }
            if let Some(ns) = &frame.namespace {
                if ns.symbol(name).is_some() {
                    return ns.assign(name, value);
                }
            }
        }
        Err(VgError::new(
            DiagnosticKind::NameError,
            format!("undefined variable `{name}`"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: &Option<Value>) -> String {
        value.as_ref().map(|v| v.to_string()).unwrap_or_default()
    }

    #[test]
    fn inner_frames_shadow_outer_ones() {
        let mut stack = ScopeStack::new();
        stack.define("x", Value::integer(1));
        stack.push(Scope::new());
        stack.define("x", Value::integer(2));
        assert_eq!(int(&stack.lookup("x").unwrap()), "2");
        stack.pop();
        assert_eq!(int(&stack.lookup("x").unwrap()), "1");
    }

    #[test]
    fn const_binding_rejects_assignment_even_with_outer_variable() {
        let mut stack = ScopeStack::new();
        stack.define("x", Value::integer(0));
        stack.push(Scope::new());
        stack.define_const("x", Value::integer(1));
        let err = stack.assign("x", Value::integer(2)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::ConstError);
    }

    #[test]
    fn conflicting_wildcard_origins_mark_ambiguity() {
        let mut stack = ScopeStack::new();
        stack.define_with_origin("foo", Value::integer(1), "A.X", false);
        stack.define_with_origin("foo", Value::integer(2), "B.Y", false);
        let err = stack.lookup("foo").unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::ImportError);
    }

    #[test]
    fn same_origin_reimport_is_not_ambiguous() {
        let mut stack = ScopeStack::new();
        stack.define_with_origin("foo", Value::integer(1), "A.X", false);
        stack.define_with_origin("foo", Value::integer(3), "A.X", false);
        assert_eq!(int(&stack.lookup("foo").unwrap()), "3");
    }

    #[test]
    fn redeclaring_clears_ambiguity() {
        let mut stack = ScopeStack::new();
        stack.define_with_origin("foo", Value::integer(1), "A.X", false);
        stack.define_with_origin("foo", Value::integer(2), "B.Y", false);
        stack.define("foo", Value::integer(7));
        assert_eq!(int(&stack.lookup("foo").unwrap()), "7");
    }

    #[test]
    fn variables_take_precedence_over_functions_for_lookup() {
        let mut stack = ScopeStack::new();
        stack.define_function("f", Value::string("function"));
        stack.push(Scope::new());
        assert_eq!(int(&stack.lookup("f").unwrap()), "function");
        stack.define("f", Value::string("variable"));
        assert_eq!(int(&stack.lookup("f").unwrap()), "variable");
        assert_eq!(int(&stack.lookup_callable("f").unwrap()), "variable");
    }

    #[test]
    fn undefined_assignment_is_a_name_error() {
        let mut stack = ScopeStack::new();
        let err = stack.assign("missing", Value::null()).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::NameError);
    }

    #[test]
    fn global_frame_is_never_popped() {
        let mut stack = ScopeStack::new();
        stack.pop();
        assert_eq!(stack.depth(), 1);
    }
}

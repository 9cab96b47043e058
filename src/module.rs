use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    diagnostics::{DiagnosticKind, Result, VgError},
    object::Library,
};

/// Libraries known to one interpreter. Append-only: a library, once
/// registered, is never replaced or removed.
#[derive(Default)]
pub struct ModuleRegistry {
    libraries: IndexMap<String, Rc<Library>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, library: Library) -> Result<Rc<Library>> {
        if self.libraries.contains_key(&library.name) {
            return Err(VgError::new(
                DiagnosticKind::ImportError,
                format!("library `{}` is already registered", library.name),
            ));
        }
        let library = Rc::new(library);
        self.libraries
            .insert(library.name.clone(), Rc::clone(&library));
        Ok(library)
    }

    pub fn get(&self, name: &str) -> Option<Rc<Library>> {
        self.libraries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.libraries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

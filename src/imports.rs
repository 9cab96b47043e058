use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    ast::{ImportTarget, NamespaceDecl, NamespaceItem, Program, StmtKind},
    diagnostics::{DiagnosticKind, Result, VgError},
    object::{Closure, Function, Library, Namespace},
    parser,
    runtime::Interpreter,
    scope::Scope,
    value::Value,
};

pub const LIBRARY_EXTENSION: &str = "vglib";

fn import_error(message: impl Into<String>) -> VgError {
    VgError::new(DiagnosticKind::ImportError, message)
}

impl Interpreter {
    pub(crate) fn declare_library(&mut self, name: &str, namespaces: &[NamespaceDecl]) -> Result<()> {
        if self.registry.contains(name) {
            return Err(import_error(format!("library `{name}` is already registered")));
        }
        let mut built = IndexMap::new();
        for decl in namespaces {
            let namespace = self.build_namespace(decl, format!("{name}.{}", decl.name))?;
            built.insert(decl.name.clone(), namespace);
        }
        let library = self.registry.register(Library {
            name: name.to_string(),
            namespaces: built,
        })?;
        debug!(
            library = %library.name,
            namespaces = library.namespaces.len(),
            "registered library"
        );
        Ok(())
    }

    /// Functions are bound first so initializers and class defaults can
    /// call any function of the same namespace.
    fn build_namespace(&mut self, decl: &NamespaceDecl, path: String) -> Result<Rc<Namespace>> {
        let namespace = Rc::new(Namespace::new(decl.name.clone(), path));
        for (item, _) in &decl.items {
            if let NamespaceItem::Function(function) = item {
                let value = Value::function(Function {
                    decl: Rc::clone(function),
                    closure: Closure::Namespace(Rc::clone(&namespace)),
                });
                namespace.define(function.name.clone(), value, false);
            }
        }
        self.with_scope(Scope::with_namespace(Some(Rc::clone(&namespace))), |interp| {
            for (item, span) in &decl.items {
                interp
                    .namespace_item(&namespace, item)
                    .map_err(|err| err.with_span(*span))?;
            }
            Ok(())
        })?;
        Ok(namespace)
    }

    fn namespace_item(&mut self, namespace: &Rc<Namespace>, item: &NamespaceItem) -> Result<()> {
        match item {
            NamespaceItem::Function(_) => {}
            NamespaceItem::Var { name, value } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::null(),
                };
                namespace.define(name.clone(), value, false);
            }
            NamespaceItem::Const { name, value } => {
                let value = self.evaluate(value)?;
                namespace.define(name.clone(), value, true);
            }
            NamespaceItem::Class(decl) => {
                self.declare_class(decl, Some(namespace))?;
            }
            NamespaceItem::Namespace(child) => {
                let child = self.build_namespace(child, format!("{}.{}", namespace.path, child.name))?;
                namespace.add_child(child);
            }
        }
        Ok(())
    }

    pub(crate) fn import(&mut self, target: &ImportTarget, alias: Option<&str>) -> Result<()> {
        match target {
            ImportTarget::Path(path) => self.import_path(path, alias),
            ImportTarget::Wildcard(path) => self.import_wildcard(path),
            ImportTarget::File(file) => self.import_file(file, alias),
        }
    }

    fn resolve_namespace(&self, path: &[String]) -> Result<Rc<Namespace>> {
        let [library_name, namespace_name, children @ ..] = path else {
            return Err(import_error(format!(
                "import path `{}` must name a library and a namespace",
                path.join(".")
            )));
        };
        let library = self
            .registry
            .get(library_name)
            .ok_or_else(|| import_error(format!("unknown library `{library_name}`")))?;
        let mut namespace = library.namespace(namespace_name).ok_or_else(|| {
            import_error(format!(
                "library `{library_name}` has no namespace `{namespace_name}`"
            ))
        })?;
        for child in children {
            namespace = namespace.child(child).ok_or_else(|| {
                import_error(format!(
                    "namespace `{}` has no namespace `{child}`",
                    namespace.path
                ))
            })?;
        }
        Ok(namespace)
    }

    fn import_path(&mut self, path: &[String], alias: Option<&str>) -> Result<()> {
        let namespace_error = match self.resolve_namespace(path) {
            Ok(namespace) => {
                let name = alias.unwrap_or(namespace.name.as_str()).to_string();
                debug!(namespace = %namespace.path, as_name = %name, "imported namespace");
                self.scopes.define(name, Value::namespace(namespace));
                return Ok(());
            }
            Err(err) => err,
        };
        let Some((symbol_name, namespace_path)) = path.split_last() else {
            return Err(namespace_error);
        };
        if namespace_path.len() < 2 {
            return Err(namespace_error);
        }
        let namespace = self.resolve_namespace(namespace_path)?;
        let symbol = namespace.symbol(symbol_name).ok_or_else(|| {
            import_error(format!(
                "namespace `{}` has no symbol `{symbol_name}`",
                namespace.path
            ))
        })?;
        let name = alias.unwrap_or(symbol_name.as_str());
        debug!(symbol = %symbol_name, from = %namespace.path, as_name = %name, "imported symbol");
        self.scopes
            .define_imported(name, symbol.value, &namespace.path, symbol.constant);
        Ok(())
    }

    fn import_wildcard(&mut self, path: &[String]) -> Result<()> {
        let namespace = self.resolve_namespace(path)?;
        let symbols: Vec<_> = namespace
            .symbols
            .borrow()
            .iter()
            .map(|(name, symbol)| (name.clone(), symbol.clone()))
            .collect();
        debug!(namespace = %namespace.path, symbols = symbols.len(), "wildcard import");
        for (name, symbol) in symbols {
            self.scopes
                .define_with_origin(&name, symbol.value, &namespace.path, symbol.constant);
        }
        self.scopes
            .define(namespace.name.clone(), Value::namespace(namespace));
        Ok(())
    }

    /// Runs another source file in the current frame. With an alias, the
    /// file must declare exactly one class, which is bound to the alias.
    fn import_file(&mut self, file: &str, alias: Option<&str>) -> Result<()> {
        let path = self.resolve_import_file(file)?;
        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if self.context.import_chain.contains(&key) {
            return Err(import_error(format!(
                "circular import of `{}`",
                path.display()
            )));
        }
        let source = fs::read_to_string(&path)
            .map_err(|err| import_error(format!("cannot read `{}`: {err}", path.display())))?;
        let note = format!("while importing `{}`", path.display());
        let program = parser::parse_program(&source)
            .map_err(|diag| VgError::from(diag).in_file(&path).with_note(note.clone()))?;

        debug!(file = %path.display(), "importing file");
        let previous = self.context.current_file.replace(path.clone());
        self.context.import_chain.push(key);
        let result = self.run_program(&program.items);
        self.context.import_chain.pop();
        self.context.current_file = previous;
        result.map_err(|err| err.in_file(&path).with_note(note))?;

        match alias {
            Some(alias) => self.bind_file_alias(&program, &path, alias),
            None => Ok(()),
        }
    }

    fn bind_file_alias(&mut self, program: &Program, path: &Path, alias: &str) -> Result<()> {
        let classes: Vec<&str> = program
            .items
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::Class(decl) => Some(decl.name.as_str()),
                _ => None,
            })
            .collect();
        match classes.as_slice() {
            [class] => {
                let value = self.lookup_name(class)?;
                self.scopes.define(alias, value);
                Ok(())
            }
            [] => Err(import_error(format!(
                "`{}` declares no class to bind to `{alias}`",
                path.display()
            ))),
            several => Err(import_error(format!(
                "`{}` declares several classes ({}); `{alias}` would be ambiguous",
                path.display(),
                several.join(", ")
            ))),
        }
    }

    fn resolve_import_file(&self, file: &str) -> Result<PathBuf> {
        let requested = Path::new(file);
        if let Some(dir) = self.context.current_file.as_deref().and_then(Path::parent) {
            let candidate = dir.join(requested);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        if requested.is_file() {
            return Ok(requested.to_path_buf());
        }
        Err(import_error(format!("file `{file}` not found")))
    }

    /// Registers every `library` declared in `.vglib` files under `dir`,
    /// recursively and in path order. Other statements in those files are
    /// ignored. Returns the number of libraries registered.
    pub fn load_library_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut files = Vec::new();
        collect_library_files(dir.as_ref(), &mut files)?;
        files.sort();
        let mut loaded = 0;
        for file in files {
            let source = fs::read_to_string(&file)?;
            let note = format!("while loading library file `{}`", file.display());
            let program = parser::parse_program(&source)
                .map_err(|diag| VgError::from(diag).in_file(&file).with_note(note.clone()))?;
            for stmt in &program.items {
                if let StmtKind::Library { name, namespaces } = &stmt.kind {
                    self.declare_library(name, namespaces)
                        .map_err(|err| {
                            err.with_span(stmt.span).in_file(&file).with_note(note.clone())
                        })?;
                    loaded += 1;
                }
            }
        }
        debug!(dir = %dir.as_ref().display(), loaded, "loaded library directory");
        Ok(loaded)
    }
}

fn collect_library_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_library_files(&path, files)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext == LIBRARY_EXTENSION)
        {
            files.push(path);
        }
    }
    Ok(())
}

use std::path::{Path, PathBuf};

use rhai::AST;

/// A compiled controller class. Its script functions are the class's methods.
pub struct ControllerClass {
    name: String,
    ast: AST,
    path: Option<PathBuf>,
}

impl ControllerClass {
    pub(crate) fn new(name: String, ast: AST, path: Option<PathBuf>) -> Self {
        Self { name, ast, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }

    /// Parameter counts of every method called `name`; empty when the class has none.
    pub fn method_arities(&self, name: &str) -> Vec<usize> {
        self.ast.iter_functions().filter(|f| f.name == name).map(|f| f.params.len()).collect()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == name)
    }

    /// Named methods, sorted and deduplicated. Anonymous closures are left out.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ast
            .iter_functions()
            .filter(|f| !f.name.starts_with("anon$"))
            .map(|f| f.name.to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl std::fmt::Debug for ControllerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerClass").field("name", &self.name).field("path", &self.path).finish()
    }
}

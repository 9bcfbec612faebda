// ABOUTME: Scope chain for variable bindings; lookup walks parents outward

use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// One scope frame. Frames form a chain through `parent`; closures
/// keep their defining frame alive by holding the `Rc`.
#[derive(Debug)]
pub struct Environment {
    bindings: RefCell<IndexMap<String, Value>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    /// Creates a new global environment with no parent.
    pub fn new() -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(IndexMap::new()),
            parent: None,
        })
    }

    /// Creates a child environment layered on `parent`.
    pub fn with_parent(parent: Rc<Environment>) -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(IndexMap::new()),
            parent: Some(parent),
        })
    }

    pub fn parent(&self) -> Option<Rc<Environment>> {
        self.parent.clone()
    }

    /// Defines or updates a binding in THIS scope only.
    pub fn define(&self, name: String, value: Value) {
        self.bindings.borrow_mut().insert(name, value);
    }

    /// Looks up a name here and then through parent scopes.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(ref parent) = self.parent {
            return parent.get(name);
        }
        None
    }

    /// True when the name is bound in this scope (parents not checked).
    pub fn defined_here(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// A copy of this scope's own bindings, in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.bindings.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let env = Environment::new();
        env.define("x".to_string(), Value::Number(42.0));

        assert_eq!(env.get("x"), Some(Value::Number(42.0)));
        assert!(env.get("missing").is_none());
    }

    #[test]
    fn test_shadowing() {
        let parent = Environment::new();
        parent.define("x".to_string(), Value::Number(42.0));

        let child = Environment::with_parent(parent.clone());
        child.define("x".to_string(), Value::Number(100.0));

        assert_eq!(child.get("x"), Some(Value::Number(100.0)));
        assert_eq!(parent.get("x"), Some(Value::Number(42.0)));
    }

    #[test]
    fn test_parent_lookup_through_levels() {
        let grandparent = Environment::new();
        grandparent.define("a".to_string(), Value::Number(1.0));

        let parent = Environment::with_parent(grandparent);
        parent.define("b".to_string(), Value::Number(2.0));

        let child = Environment::with_parent(parent);
        child.define("c".to_string(), Value::Number(3.0));

        assert_eq!(child.get("a"), Some(Value::Number(1.0)));
        assert_eq!(child.get("b"), Some(Value::Number(2.0)));
        assert_eq!(child.get("c"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_snapshot_is_scope_local() {
        let parent = Environment::new();
        parent.define("outer".to_string(), Value::Number(1.0));

        let child = Environment::with_parent(parent);
        child.define("inner".to_string(), Value::Number(2.0));

        let snapshot = child.snapshot();
        assert!(snapshot.contains_key("inner"));
        assert!(!snapshot.contains_key("outer"));
    }
}

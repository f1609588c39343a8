use std::collections::HashMap;
use std::rc::Rc;

use tiel::location::SourceLocation;

use crate::error::RuntimeError;
use crate::evaluator::{Evaluator, StandardEvaluator};
use crate::runtime_value::{Function, RuntimeValue};

/// Names the environment answers itself. They cannot be bound or removed.
pub const RESERVED_NAMES: [&str; 3] = ["__FILE__", "__LINE__", "__INDEX__"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// A single scope level: the root, one loop iteration, or one macro
/// expansion.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: HashMap<String, RuntimeValue>,
    /// Value of `__INDEX__` when this scope belongs to a `do` loop.
    index: Option<i64>,
}

impl Scope {
    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: RuntimeValue) {
        self.variables.insert(name.to_string(), value);
    }
}

/// The variable environment: a stack of scopes searched innermost first,
/// the location of the line being processed, and the evaluator used for
/// expression text.
pub struct Environment {
    scopes: Vec<Scope>,
    location: SourceLocation,
    evaluator: Rc<dyn Evaluator>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment::with_evaluator(Rc::new(StandardEvaluator))
    }

    pub fn with_evaluator(evaluator: Rc<dyn Evaluator>) -> Self {
        Environment {
            scopes: vec![Scope::default()],
            location: SourceLocation::new("<none>", 1),
            evaluator,
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Push the scope of one loop iteration. The loop variable and
    /// `__INDEX__` both take the iteration value.
    pub fn push_loop_scope(&mut self, variable: &str, value: i64) -> Result<(), RuntimeError> {
        if is_reserved(variable) {
            return Err(RuntimeError::ReservedName(variable.to_string()));
        }
        let mut scope = Scope {
            variables: HashMap::new(),
            index: Some(value),
        };
        scope.set_variable(variable, RuntimeValue::Integer(value));
        self.scopes.push(scope);
        Ok(())
    }

    /// Pop the innermost scope. The root scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind `name` in the run scope, where it outlives loop iterations and
    /// macro expansions. An inner binding of the same name still shadows it.
    pub fn define(&mut self, name: &str, value: RuntimeValue) -> Result<(), RuntimeError> {
        if is_reserved(name) {
            return Err(RuntimeError::ReservedName(name.to_string()));
        }
        if let Some(scope) = self.scopes.first_mut() {
            scope.set_variable(name, value);
        }
        Ok(())
    }

    /// Bind `name` in the innermost scope only: pattern captures and
    /// function parameters.
    pub fn bind_local(&mut self, name: &str, value: RuntimeValue) -> Result<(), RuntimeError> {
        if is_reserved(name) {
            return Err(RuntimeError::ReservedName(name.to_string()));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.set_variable(name, value);
        }
        Ok(())
    }

    pub fn define_function(&mut self, name: &str, params: Vec<String>, body: &str) -> Result<(), RuntimeError> {
        let function = Function {
            name: name.to_string(),
            params,
            body: body.to_string(),
        };
        self.define(name, RuntimeValue::Function(Rc::new(function)))
    }

    /// Remove each name from the innermost scope that binds it. Every name
    /// is checked before any is removed.
    pub fn undefine(&mut self, names: &[String]) -> Result<(), RuntimeError> {
        for name in names {
            if is_reserved(name) {
                return Err(RuntimeError::ReservedName(name.clone()));
            }
            if !self.is_bound(name) {
                return Err(RuntimeError::UndefinedVariable(name.clone()));
            }
        }
        for name in names {
            if let Some(scope) = self.scopes.iter_mut().rev().find(|s| s.variables.contains_key(name)) {
                scope.variables.remove(name);
            }
        }
        Ok(())
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.variables.contains_key(name))
    }

    /// True when `name` is bound or reserved-and-available.
    pub fn is_defined(&self, name: &str) -> bool {
        match name {
            "__FILE__" | "__LINE__" => true,
            "__INDEX__" => self.index().is_some(),
            _ => self.is_bound(name),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<RuntimeValue, RuntimeError> {
        match name {
            "__FILE__" => return Ok(RuntimeValue::String(self.location.file.clone())),
            "__LINE__" => return Ok(RuntimeValue::Integer(i64::from(self.location.line))),
            "__INDEX__" => {
                return self
                    .index()
                    .map(RuntimeValue::Integer)
                    .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()));
            }
            _ => {}
        }
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get_variable(name))
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    /// Iteration value of the innermost enclosing loop.
    pub fn index(&self) -> Option<i64> {
        self.scopes.iter().rev().find_map(|scope| scope.index)
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn set_location(&mut self, location: SourceLocation) {
        self.location = location;
    }

    /// Evaluate expression text against this environment.
    pub fn evaluate(&mut self, text: &str) -> Result<RuntimeValue, RuntimeError> {
        let evaluator = Rc::clone(&self.evaluator);
        evaluator.evaluate(text, self)
    }
}

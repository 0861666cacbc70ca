//! Sandboxed expressions for field transformations
//!
//! Expressions are single Rhai expressions (no statements, no imports,
//! no `eval`) evaluated against two variables:
//!
//! - `value` - the source field value
//! - `record` - the whole input record
//!
//! ```text
//! value * 100
//! value.to_upper() + "-" + record.country
//! if value > 18 { "adult" } else { "minor" }
//! ```

use std::sync::Arc;

use node_engine::{NodeEngineError, Result};
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;

/// A compiled expression, cheap to clone
#[derive(Clone)]
pub struct CompiledExpression {
    source: String,
    ast: Arc<AST>,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompiledExpression").field(&self.source).finish()
    }
}

/// Restricted Rhai engine
pub struct ExpressionEngine {
    engine: Engine,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();

        // Safety limits
        engine.set_max_expr_depths(32, 32);
        engine.set_max_call_levels(16);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});

        Self { engine }
    }

    /// Parse an expression, rejecting statements
    pub fn compile(&self, source: &str) -> Result<CompiledExpression> {
        let ast = self
            .engine
            .compile_expression(source)
            .map_err(|e| NodeEngineError::Expression(format!("'{}': {}", source, e)))?;
        Ok(CompiledExpression {
            source: source.to_string(),
            ast: Arc::new(ast),
        })
    }

    /// Evaluate with `value` and `record` in scope
    pub fn evaluate(&self, expression: &CompiledExpression, value: &Value, record: &Value) -> Result<Value> {
        let mut scope = Scope::new();
        scope.push_dynamic("value", to_dynamic(value)?);
        scope.push_dynamic("record", to_dynamic(record)?);

        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, &expression.ast)
            .map_err(|e| NodeEngineError::Expression(format!("'{}': {}", expression.source, e)))?;

        rhai::serde::from_dynamic::<Value>(&result)
            .map_err(|e| NodeEngineError::Expression(format!("'{}': {}", expression.source, e)))
    }
}

fn to_dynamic(value: &Value) -> Result<Dynamic> {
    rhai::serde::to_dynamic(value).map_err(|e| NodeEngineError::Expression(e.to_string()))
}

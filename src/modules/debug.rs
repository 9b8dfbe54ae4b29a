//! Debug module - Print debug messages and variable values
//!
//! Runs entirely on the control side and never reports a change.

use async_trait::async_trait;
use serde_json::Value;

use super::{
    Module, ModuleContext, ModuleError, ModuleParams, ModuleResult, Observed, ParamExt, Plan,
};

/// Module for printing debug messages and variable values
pub struct DebugModule;

impl DebugModule {
    fn format_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            _ => serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value)),
        }
    }
}

#[async_trait]
impl Module for DebugModule {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn description(&self) -> &'static str {
        "Print a message or the value of a variable"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        if params.contains_key("msg") && params.contains_key("var") {
            return Err(ModuleError::InvalidParameter(
                "'msg' and 'var' are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    async fn observe(
        &self,
        _params: &ModuleParams,
        _context: &ModuleContext,
    ) -> ModuleResult<Observed> {
        Ok(Observed::new())
    }

    fn plan(
        &self,
        params: &ModuleParams,
        _observed: &Observed,
        context: &ModuleContext,
    ) -> ModuleResult<Plan> {
        if let Some(var) = params.get_string("var")? {
            let value = context.vars.lookup(&var).cloned();
            let shown = value
                .as_ref()
                .map(Self::format_value)
                .unwrap_or_else(|| "VARIABLE IS NOT DEFINED!".to_string());
            return Ok(Plan::noop(format!("{}: {}", var, shown))
                .with_data(var, value.unwrap_or(Value::Null)));
        }

        let msg = match params.get("msg").or_else(|| params.get("_raw_params")) {
            Some(value) => Self::format_value(value),
            None => "Hello world!".to_string(),
        };
        Ok(Plan::noop(msg))
    }
}

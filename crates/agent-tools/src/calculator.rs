//! Calculator Tool
//!
//! Two-operand arithmetic. Integer operands stay integers for addition,
//! subtraction and multiplication; division always yields a float.

use agent_core::tool::{ParamType, ParameterSchema, Parameters, number_param, str_param};
use agent_core::{Tool, ToolError, ToolSchema};
use async_trait::async_trait;
use serde_json::{Number, Value, json};

/// Tool for basic arithmetic
pub struct CalculatorTool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    const NAMES: [&'static str; 4] = ["add", "subtract", "multiply", "divide"];

    fn parse(name: &str) -> Result<Self, ToolError> {
        match name {
            "add" => Ok(Self::Add),
            "subtract" => Ok(Self::Subtract),
            "multiply" => Ok(Self::Multiply),
            "divide" => Ok(Self::Divide),
            other => Err(ToolError::invalid(format!("unsupported operation: {other}"))),
        }
    }

    fn apply_int(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Self::Add => a.checked_add(b),
            Self::Subtract => a.checked_sub(b),
            Self::Multiply => a.checked_mul(b),
            Self::Divide => None,
        }
    }

    fn apply_float(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide => a / b,
        }
    }
}

fn as_float(n: &Number) -> Result<f64, ToolError> {
    n.as_f64()
        .ok_or_else(|| ToolError::invalid(format!("{n} is not representable as a float")))
}

fn calculate(a: &Number, b: &Number, op: Operation) -> Result<Value, ToolError> {
    if op == Operation::Divide && as_float(b)? == 0.0 {
        return Err(ToolError::execution("division by zero"));
    }

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = op.apply_int(x, y) {
            return Ok(json!(result));
        }
    }

    let result = op.apply_float(as_float(a)?, as_float(b)?);
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| ToolError::execution(format!("result of {a} {op:?} {b} is not finite")))
}

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "calculator".into(),
            description: "Perform arithmetic on two numbers: add, subtract, multiply or divide.".into(),
            parameters: vec![
                ParameterSchema::required("a", ParamType::Number, "First operand"),
                ParameterSchema::required("b", ParamType::Number, "Second operand"),
                ParameterSchema::required("operation", ParamType::String, "One of add, subtract, multiply, divide")
                    .with_enum(Operation::NAMES.iter().map(|n| json!(n)).collect()),
            ],
            category: Some("math".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, params: &Parameters) -> Result<Value, ToolError> {
        let a = number_param(params, "a")?;
        let b = number_param(params, "b")?;
        let op = Operation::parse(str_param(params, "operation")?)?;
        calculate(&a, &b, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(a: Value, b: Value, operation: &str) -> Parameters {
        Parameters::from([
            ("a".to_string(), a),
            ("b".to_string(), b),
            ("operation".to_string(), json!(operation)),
        ])
    }

    #[tokio::test]
    async fn integer_operands_stay_integers() {
        let tool = CalculatorTool;
        assert_eq!(tool.call(&params(json!(10), json!(5), "add")).await.unwrap(), json!(15));
        assert_eq!(tool.call(&params(json!(10), json!(5), "subtract")).await.unwrap(), json!(5));
        assert_eq!(tool.call(&params(json!(-4), json!(6), "multiply")).await.unwrap(), json!(-24));
    }

    #[tokio::test]
    async fn division_yields_float() {
        let tool = CalculatorTool;
        assert_eq!(tool.call(&params(json!(10), json!(4), "divide")).await.unwrap(), json!(2.5));
        assert_eq!(tool.call(&params(json!(10), json!(5), "divide")).await.unwrap(), json!(2.0));
    }

    #[tokio::test]
    async fn mixed_operands_use_float_math() {
        let result = CalculatorTool.call(&params(json!(1.5), json!(2), "add")).await.unwrap();
        assert_eq!(result, json!(3.5));
    }

    #[tokio::test]
    async fn integer_overflow_falls_back_to_float() {
        let result = CalculatorTool
            .call(&params(json!(i64::MAX), json!(1), "add"))
            .await
            .unwrap();
        assert!(result.is_f64());
    }

    #[tokio::test]
    async fn division_by_zero_is_an_execution_error() {
        let err = CalculatorTool
            .call(&params(json!(1), json!(0), "divide"))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Execution("division by zero".into()));
    }

    #[test]
    fn unknown_operation_is_rejected_by_the_schema() {
        let err = CalculatorTool.validate(&params(json!(1), json!(2), "modulo")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[test]
    fn missing_operand_is_rejected() {
        let mut p = params(json!(1), json!(2), "add");
        p.remove("b");
        assert!(CalculatorTool.validate(&p).is_err());
    }
}

//! Date/Time Tool

use std::fmt::Write;

use agent_core::tool::{ParamType, ParameterSchema, Parameters, opt_str_param};
use agent_core::{Tool, ToolError, ToolSchema};
use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::{Value, json};

/// Tool reporting the current date and time
pub struct DateTimeTool;

fn render<Tz>(now: &DateTime<Tz>, format: Option<&str>) -> Result<String, ToolError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Some(format) = format else {
        return Ok(now.to_rfc3339());
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ToolError::invalid(format!("invalid strftime format: '{format}'")));
    }

    let mut out = String::new();
    write!(out, "{}", now.format_with_items(items.into_iter()))
        .map_err(|_| ToolError::execution(format!("cannot render time with format '{format}'")))?;
    Ok(out)
}

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "datetime".into(),
            description: "Get the current date and time, optionally formatted with a strftime pattern.".into(),
            parameters: vec![
                ParameterSchema::optional("format", ParamType::String, "strftime pattern, e.g. '%Y-%m-%d %H:%M'"),
                ParameterSchema::optional("timezone", ParamType::String, "'local' or 'utc'")
                    .with_default(json!("local"))
                    .with_enum(vec![json!("local"), json!("utc")]),
            ],
            category: Some("time".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, params: &Parameters) -> Result<Value, ToolError> {
        let format = opt_str_param(params, "format");
        let text = match opt_str_param(params, "timezone") {
            Some("utc") => render(&Utc::now(), format)?,
            _ => render(&Local::now(), format)?,
        };
        Ok(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rendering_is_rfc3339() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(render(&at, None).unwrap(), "2024-03-01T09:30:00+00:00");
    }

    #[test]
    fn custom_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(render(&at, Some("%Y-%m-%d %H:%M")).unwrap(), "2024-03-01 09:30");
    }

    #[test]
    fn bad_format_is_a_parameter_error() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert!(matches!(render(&at, Some("%Q")), Err(ToolError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn utc_now_parses_back() {
        let params = Parameters::from([("timezone".to_string(), json!("utc"))]);
        let value = DateTimeTool.call(&params).await.unwrap();
        let parsed = DateTime::parse_from_rfc3339(value.as_str().unwrap()).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }
}

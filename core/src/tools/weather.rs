use crate::tools::{extract_string_arg, extract_string_arg_opt};
use crate::traits::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

const STUB_TEMPERATURE: i64 = 30;

/// Canned weather report; useful for exercising the tool loop end to end.
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_current_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather in a given location"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"]
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Map<String, Value>) -> anyhow::Result<ToolResult> {
        let location = extract_string_arg(args, "location")?;
        let unit = extract_string_arg_opt(args, "unit", "celsius");

        let mut data = Map::new();
        data.insert("temperature".into(), json!(STUB_TEMPERATURE));
        data.insert("unit".into(), json!(unit));
        data.insert(
            "description".into(),
            json!(format!("The temperature in {} is {}", location, STUB_TEMPERATURE)),
        );
        Ok(ToolResult::success(data))
    }
}

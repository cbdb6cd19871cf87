//! The single prompt template exposed to clients.

use crate::core::error::DispatchError;
use serde::Serialize;
use serde_json::{Value, json};

pub const DEMO_PROMPT_NAME: &str = "mcp-demo";

const TOPIC_PLACEHOLDER: &str = "{topic}";

const DEMO_TEMPLATE: &str = "\
You are a data analyst walking a business user through a live SQLite database. \
The user has chosen the topic: {topic}.

Start by explaining that you can create tables, load sample data, run queries \
and record business insights in a shared memo. Keep the tone practical and \
skip jargon unless the user asks for it.

Step 1. Design a small schema that fits {topic}: two or three related tables \
with sensible primary keys. Create them with the create_table tool and confirm \
the result with list_tables and describe_table.

Step 2. Populate the tables with a realistic handful of rows using write_query. \
Vary the values so that later queries have something interesting to reveal.

Step 3. Offer the user a few analytical questions about {topic}. For each one \
they pick, write a read_query, show the rows and explain what they mean.

Step 4. Whenever an answer uncovers something worth keeping, record it with \
append_insight. The memo at memo://insights collects every insight in the \
order it was found; point the user to it at the end.

Close by summarising what was built and which insights were recorded.";

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

pub fn list_prompts() -> Vec<PromptDescriptor> {
    vec![PromptDescriptor {
        name: DEMO_PROMPT_NAME,
        description: "A prompt to seed the database with initial data and demonstrate what you can do with this server",
        arguments: vec![PromptArgument {
            name: "topic",
            description: "Topic to seed the database with initial data",
            required: true,
        }],
    }]
}

pub fn render_demo(topic: &str) -> String {
    DEMO_TEMPLATE.replace(TOPIC_PLACEHOLDER, topic)
}

/// Renders prompt `name` as a `prompts/get` result.
///
/// # Errors
///
/// `UnknownPrompt` for any name other than [`DEMO_PROMPT_NAME`];
/// `InvalidArguments` when `topic` is absent or not a string.
pub fn get_prompt(name: &str, arguments: Option<&Value>) -> Result<Value, DispatchError> {
    if name != DEMO_PROMPT_NAME {
        return Err(DispatchError::unknown_prompt(name));
    }
    let topic = arguments
        .and_then(|args| args.get("topic"))
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::invalid_arguments(name, "Missing required argument: topic"))?;

    Ok(json!({
        "description": format!("Demo template for {topic}"),
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": render_demo(topic).trim() },
        }],
    }))
}

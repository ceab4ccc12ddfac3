//! Conversion between conversation items and raw OpenAI chat types
//!
//! Pure functions used at the provider edge. Nothing here talks to the network.
//!
//! - `to_openai_messages`: `Message` list into request messages, keeping
//!   assistant tool calls and author names
//! - `to_openai_tools`: advertised tools into function tool definitions
//! - `from_openai_message`: response message into a `ModelReply`

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionResponseMessage, ChatCompletionTool, ChatCompletionToolType,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, FunctionCall, FunctionObject,
};
use serde_json::Value;

use crate::items::{Message, Role, ToolCall};
use crate::provider::{ModelReply, ModelRequest, ToolSpec};

/// Build a full chat completion request.
pub fn to_openai_request(
    model: &str,
    temperature: Option<f32>,
    req: &ModelRequest,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let mut builder = CreateChatCompletionRequestArgs::default();
    builder
        .model(model)
        .messages(to_openai_messages(&req.messages)?);
    // The API rejects an empty tools array
    if !req.tools.is_empty() {
        builder.tools(to_openai_tools(&req.tools));
    }
    if let Some(t) = temperature {
        builder.temperature(t);
    }
    builder.build()
}

pub fn to_openai_messages(
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    messages.iter().map(to_openai_message).collect()
}

fn to_openai_message(msg: &Message) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let converted = match msg.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(msg.content.clone())
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(msg.content.clone())
            .build()?
            .into(),
        Role::Assistant => {
            let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
            if !msg.content.is_empty() || !msg.has_tool_calls() {
                builder.content(msg.content.clone());
            }
            if let Some(author) = msg.author() {
                builder.name(author);
            }
            if msg.has_tool_calls() {
                builder.tool_calls(
                    msg.tool_calls()
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect::<Vec<_>>(),
                );
            }
            builder.build()?.into()
        }
        Role::Tool => ChatCompletionRequestToolMessageArgs::default()
            .content(msg.content.clone())
            .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
            .build()?
            .into(),
    };
    Ok(converted)
}

pub fn to_openai_tools(tools: &[ToolSpec]) -> Vec<ChatCompletionTool> {
    tools
        .iter()
        .map(|t| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: t.name.clone(),
                description: Some(t.description.clone()),
                parameters: Some(t.parameters.clone()),
                ..Default::default()
            },
        })
        .collect()
}

/// Convert the first choice's message into a reply. Token counts are filled in
/// by the caller.
pub fn from_openai_message(message: ChatCompletionResponseMessage) -> ModelReply {
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
        .collect();
    ModelReply {
        content: message.content.filter(|c| !c.is_empty()),
        tool_calls,
        ..Default::default()
    }
}

/// Arguments arrive as a JSON string. Empty means no arguments; text that does
/// not parse is kept verbatim so the tool can report it.
pub fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments(r#"{"seconds": 30}"#), json!({"seconds": 30}));
        assert_eq!(parse_arguments("{oops"), json!("{oops"));
    }

    #[test]
    fn test_assistant_tool_calls_are_preserved() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("call_1", "start_microwave", json!({"seconds": 30}))],
        )
        .with_author("microwave");
        let converted = to_openai_messages(&[msg]).unwrap();

        match &converted[0] {
            ChatCompletionRequestMessage::Assistant(a) => {
                assert_eq!(a.name.as_deref(), Some("microwave"));
                let calls = a.tool_calls.as_ref().unwrap();
                assert_eq!(calls[0].id, "call_1");
                assert_eq!(calls[0].function.name, "start_microwave");
                let args: Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
                assert_eq!(args, json!({"seconds": 30}));
                assert!(a.content.is_none());
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_message_keeps_call_id() {
        let converted = to_openai_messages(&[Message::tool("Microwave stopped.", "call_9")]).unwrap();
        match &converted[0] {
            ChatCompletionRequestMessage::Tool(t) => assert_eq!(t.tool_call_id, "call_9"),
            other => panic!("expected tool message, got {other:?}"),
        }
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let req = ModelRequest {
            messages: vec![Message::user("hi")],
            tools: vec![],
        };
        let built = to_openai_request("gpt-4o", None, &req).unwrap();
        assert!(built.tools.is_none());

        let req = ModelRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolSpec {
                name: "stop_microwave".into(),
                description: "Stops the microwave".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
        };
        let built = to_openai_request("gpt-4o", Some(0.2), &req).unwrap();
        let tools = built.tools.unwrap();
        assert_eq!(tools[0].function.name, "stop_microwave");
        assert_eq!(built.temperature, Some(0.2));
    }
}

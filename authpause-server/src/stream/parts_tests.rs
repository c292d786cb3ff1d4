//! Wire format tests for stream parts.

use super::*;
use serde_json::json;

#[test]
fn test_part_type_names() {
    let cases = [
        (
            StreamPart::Start {
                message_id: "m1".to_string(),
            },
            "start",
        ),
        (
            StreamPart::ToolInputAvailable {
                tool_call_id: "c1".to_string(),
                tool_name: "buy_stock".to_string(),
                input: json!({}),
            },
            "tool-input-available",
        ),
        (
            StreamPart::ToolOutputAvailable {
                tool_call_id: "c1".to_string(),
                output: json!("done"),
            },
            "tool-output-available",
        ),
        (
            StreamPart::Error {
                error_text: "An error occurred.".to_string(),
            },
            "error",
        ),
        (StreamPart::Finish, "finish"),
    ];

    for (part, expected) in cases {
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], expected, "{:?}", part);
    }
}

#[test]
fn test_payload_fields_are_camel_case() {
    let value = serde_json::to_value(StreamPart::ToolInputAvailable {
        tool_call_id: "c1".to_string(),
        tool_name: "buy_stock".to_string(),
        input: json!({"ticker": "ZEKO"}),
    })
    .unwrap();

    assert_eq!(value["toolCallId"], "c1");
    assert_eq!(value["toolName"], "buy_stock");
    assert_eq!(value["input"]["ticker"], "ZEKO");

    let value = serde_json::to_value(StreamPart::Error {
        error_text: "x".to_string(),
    })
    .unwrap();
    assert_eq!(value, json!({"type": "error", "errorText": "x"}));
}

#[test]
fn test_finish_has_no_payload() {
    assert_eq!(
        serde_json::to_value(StreamPart::Finish).unwrap(),
        json!({"type": "finish"})
    );
}

#[test]
fn test_parts_deserialize() {
    let part: StreamPart =
        serde_json::from_str(r#"{"type":"tool-output-available","toolCallId":"c9","output":42}"#)
            .unwrap();
    assert_eq!(
        part,
        StreamPart::ToolOutputAvailable {
            tool_call_id: "c9".to_string(),
            output: json!(42),
        }
    );
}

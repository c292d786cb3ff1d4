use crate::interrupt::Interrupt;
use crate::tool::ToolError;

/// Sent in place of any error that is not an interrupt
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred.";

/// Text for the error channel of a streamed response.
///
/// Interrupts are written as `AUTH0_AI_INTERRUPTION:{json}` so the client can
/// act on them. Every other error is logged and replaced with
/// [`GENERIC_ERROR_MESSAGE`].
pub fn stream_error_text(error: &ToolError) -> String {
    let Some(interrupt) = error.interrupt() else {
        log::error!("tool error hidden from client: {}", error);
        return GENERIC_ERROR_MESSAGE.to_string();
    };

    match interrupt.to_wire() {
        Ok(wire) => wire,
        Err(e) => {
            log::error!(
                "failed to encode interrupt for {}: {}",
                interrupt.tool_call_id(),
                e
            );
            GENERIC_ERROR_MESSAGE.to_string()
        }
    }
}

/// Client side: recover the interrupt from an error string, if it is one
pub fn parse_stream_error(text: &str) -> Option<Interrupt> {
    if !Interrupt::is_wire(text) {
        return None;
    }
    match Interrupt::from_wire(text) {
        Ok(interrupt) => Some(interrupt),
        Err(e) => {
            log::warn!("malformed interrupt on stream: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{InterruptKind, INTERRUPT_PREFIX};

    #[test]
    fn test_interrupt_becomes_wire_text() {
        let err = ToolError::from(Interrupt::new(
            "call_1",
            InterruptKind::FederatedConnection {
                connection: "google-oauth2".into(),
                required_scopes: vec!["https://www.googleapis.com/auth/calendar.freebusy".into()],
            },
        ));

        let text = stream_error_text(&err);
        assert!(text.starts_with(INTERRUPT_PREFIX));

        let parsed = parse_stream_error(&text).unwrap();
        assert_eq!(parsed.tool_call_id(), "call_1");
        assert_eq!(parsed.code(), "FEDERATED_CONNECTION_ERROR");
    }

    #[test]
    fn test_other_errors_are_generic() {
        let err = ToolError::Custom("database password is hunter2".into());
        assert_eq!(stream_error_text(&err), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_parse_ignores_plain_errors() {
        assert!(parse_stream_error(GENERIC_ERROR_MESSAGE).is_none());
        assert!(parse_stream_error("AUTH0_AI_INTERRUPTION:{not json").is_none());
    }
}

//! Conversion from [`GatewayError`] into the Checkout envelope's
//! `messages[]` entry, preserving the §3.1 well-formed-error invariant.

use ucp_core::Message;
use ucp_error::GatewayError;

/// Convert a [`GatewayError`] into a single leading error [`Message`]
/// (§7): the envelope always carries a severity on error messages.
#[must_use]
pub fn to_message(err: &GatewayError) -> Message {
    Message::error(err.code.as_str(), err.message.clone(), err.severity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucp_core::MessageType;
    use ucp_error::ErrorCode;

    #[test]
    fn carries_code_and_severity() {
        let err = GatewayError::validation("missing line_items");
        let msg = to_message(&err);
        assert_eq!(msg.kind, MessageType::Error);
        assert_eq!(msg.code, "VALIDATION_ERROR");
        assert!(msg.severity.is_some());
    }
}

//! Message history truncation: keep the first `number_first_messages` (the
//! system/initial-context messages) and the last `number_last_messages`,
//! dropping one boundary message when the seam would otherwise duplicate a
//! speaker's turn.

use crate::data::ChatMessage;

pub const MINIMAL_FIRST_MESSAGES_RETAINED: usize = 1;
pub const MINIMAL_LAST_MESSAGES_RETAINED: usize = 50;

pub struct HistoryMessageHandler {
    number_first_messages: usize,
    number_last_messages: usize,
}

impl Default for HistoryMessageHandler {
    fn default() -> Self {
        Self::new(MINIMAL_FIRST_MESSAGES_RETAINED, MINIMAL_LAST_MESSAGES_RETAINED)
    }
}

impl HistoryMessageHandler {
    pub fn new(number_first_messages: usize, number_last_messages: usize) -> Self {
        Self {
            number_first_messages,
            number_last_messages,
        }
    }

    /// Returns `messages` unchanged if it already fits within the first+last
    /// budget (the "overlap case"); otherwise splices the first slice and
    /// last slice together, dropping the last slice's leading message when it
    /// shares a role with the first slice's trailing message so the
    /// alternating turn pattern isn't broken by a duplicate.
    pub fn get_truncated_messages_history(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let total = messages.len();
        if total <= self.number_first_messages + self.number_last_messages {
            return messages.to_vec();
        }

        let first_part = &messages[..self.number_first_messages];
        let last_part = &messages[total - self.number_last_messages..];

        let mut result = first_part.to_vec();
        match (first_part.last(), last_part.first()) {
            (Some(a), Some(b)) if a.role == b.role => result.extend_from_slice(&last_part[1..]),
            _ => result.extend_from_slice(last_part),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Role;

    fn msg(role: Role, text: &str) -> ChatMessage {
        match role {
            Role::System => ChatMessage::system(text),
            Role::User => ChatMessage::user(text),
            Role::Assistant => ChatMessage::assistant(text),
            Role::Tool => ChatMessage::tool("call_0", text),
        }
    }

    #[test]
    fn returns_all_messages_when_within_budget() {
        let handler = HistoryMessageHandler::new(1, 50);
        let messages = vec![msg(Role::System, "s"), msg(Role::User, "u")];
        let out = handler.get_truncated_messages_history(&messages);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn truncates_middle_and_keeps_first_and_last() {
        let handler = HistoryMessageHandler::new(1, 2);
        let messages = vec![
            msg(Role::System, "sys"),
            msg(Role::User, "u1"),
            msg(Role::Assistant, "a1"),
            msg(Role::User, "u2"),
            msg(Role::Assistant, "a2"),
        ];
        let out = handler.get_truncated_messages_history(&messages);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].to_string_lossy(), "sys");
        assert_eq!(out[1].to_string_lossy(), "u2");
        assert_eq!(out[2].to_string_lossy(), "a2");
    }

    #[test]
    fn drops_duplicate_seam_role() {
        let handler = HistoryMessageHandler::new(1, 2);
        let messages = vec![
            msg(Role::User, "u0"),
            msg(Role::Assistant, "a1"),
            msg(Role::User, "u2"),
            msg(Role::Assistant, "a2"),
        ];
        let out = handler.get_truncated_messages_history(&messages);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to_string_lossy(), "u0");
        assert_eq!(out[1].to_string_lossy(), "a2");
    }
}

use crate::model::ChatMessage;

/// What the assistant says when the context does not contain the answer.
pub const NOT_FOUND_PHRASE: &str = "I cannot find the answer in the documents.";

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful AI assistant. \
Use the provided 'Context' to answer the user's question. \
If the answer is not in the context, say \"I cannot find the answer in the documents.\" \
Keep your answer concise and helpful.";

pub fn user_message(context: &str, question: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}", context, question)
}

pub fn build_messages(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(SYSTEM_INSTRUCTION), ChatMessage::user(user_message(context, question))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[test]
    fn instruction_names_the_not_found_phrase() {
        assert!(SYSTEM_INSTRUCTION.contains(NOT_FOUND_PHRASE));
    }

    #[test]
    fn user_message_layout() {
        assert_eq!(user_message("ctx", "why?"), "Context:\nctx\n\nQuestion: why?");
    }

    #[test]
    fn two_messages_system_first() {
        let msgs = build_messages("c", "q");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].role, Role::User);
    }
}

//! Translate Poe conversation history into an `OpenAI` Chat Completions request.
//!
//! Every turn maps to exactly one completion message, in order. Poe's `bot`
//! role becomes `assistant`; user turns carrying attachments can be rewritten
//! into a summarization prompt built from the attachments' parsed text.

use super::openai_types::{ChatCompletionRequest, ChatMessage};
use super::poe_types::{Attachment, ProtocolMessage, Role};
use crate::config::RelayConfig;
use crate::error::TranslateError;

/// Instruction placed ahead of attachment text ("summarize the following content").
pub const SUMMARY_PREAMBLE: &str = "请根据以下内容给出你的总结：";

/// Line wrapped around each attachment's text.
pub const ATTACHMENT_SEPARATOR: &str = "=====================================";

/// Translate a Poe query into a streaming Chat Completions request.
/// Pure function: fails before any I/O if a turn has an unknown role.
pub fn poe_to_openai(
    turns: &[ProtocolMessage],
    config: &RelayConfig,
) -> Result<ChatCompletionRequest, TranslateError> {
    let messages = translate_turns(turns, config.summarize_attachments)?;

    Ok(ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        temperature: config.temperature,
        stream: true,
        max_tokens: config.max_tokens,
    })
}

/// Map the full conversation history, turn by turn.
pub fn translate_turns(
    turns: &[ProtocolMessage],
    summarize_attachments: bool,
) -> Result<Vec<ChatMessage>, TranslateError> {
    turns
        .iter()
        .map(|turn| translate_turn(turn, summarize_attachments))
        .collect()
}

fn translate_turn(
    turn: &ProtocolMessage,
    summarize_attachments: bool,
) -> Result<ChatMessage, TranslateError> {
    let message = match Role::try_from(turn.role.as_str())? {
        Role::System => ChatMessage::system(turn.content.clone()),
        Role::Bot => ChatMessage::assistant(turn.content.clone()),
        Role::User if summarize_attachments && !turn.attachments.is_empty() => {
            ChatMessage::user(summarize_prompt(&turn.attachments))
        }
        Role::User => ChatMessage::user(turn.content.clone()),
    };
    Ok(message)
}

/// Build the summarization prompt. The turn's own text is not included.
pub fn summarize_prompt(attachments: &[Attachment]) -> String {
    let mut lines = vec![SUMMARY_PREAMBLE];
    for attachment in attachments {
        lines.push(ATTACHMENT_SEPARATOR);
        lines.push(attachment.parsed_content.as_deref().unwrap_or_default());
        lines.push(ATTACHMENT_SEPARATOR);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::openai_types::ChatRole;

    fn turn(role: &str, content: &str) -> ProtocolMessage {
        ProtocolMessage {
            role: role.to_string(),
            content: content.to_string(),
            content_type: "text/markdown".to_string(),
            sender_id: None,
            timestamp: 0,
            message_id: String::new(),
            attachments: Vec::new(),
        }
    }

    fn attachment(text: Option<&str>) -> Attachment {
        Attachment {
            url: "https://example.com/file.txt".to_string(),
            content_type: "text/plain".to_string(),
            name: "file.txt".to_string(),
            parsed_content: text.map(String::from),
        }
    }

    fn config(summarize: bool) -> RelayConfig {
        RelayConfig {
            base_url: "http://localhost".to_string(),
            api_key: None,
            model: "kimi-k2-0711-preview".to_string(),
            temperature: 1.0,
            max_tokens: 16_000,
            headers: Vec::new(),
            summarize_attachments: summarize,
        }
    }

    #[test]
    fn test_roles_map_in_order() {
        let turns = vec![
            turn("system", "Be terse."),
            turn("user", "Hi"),
            turn("bot", "Hello!"),
            turn("user", "How are you?"),
        ];

        let messages = translate_turns(&turns, false).unwrap();
        assert_eq!(
            messages,
            vec![
                ChatMessage::system("Be terse."),
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello!"),
                ChatMessage::user("How are you?"),
            ]
        );
    }

    #[test]
    fn test_bot_serializes_as_assistant() {
        let messages = translate_turns(&[turn("bot", "ok")], false).unwrap();
        let json = serde_json::to_value(&messages[0]).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "ok"}));
    }

    #[test]
    fn test_attachments_replace_user_content() {
        let mut t = turn("user", "please read this");
        t.attachments = vec![attachment(Some("first doc")), attachment(Some("second doc"))];

        let messages = translate_turns(&[t], true).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, ChatRole::User);

        let content = &messages[0].content;
        assert!(content.starts_with(SUMMARY_PREAMBLE));
        assert!(!content.contains("please read this"));
        assert_eq!(
            *content,
            format!(
                "{SUMMARY_PREAMBLE}\n{ATTACHMENT_SEPARATOR}\nfirst doc\n{ATTACHMENT_SEPARATOR}\n\
                 {ATTACHMENT_SEPARATOR}\nsecond doc\n{ATTACHMENT_SEPARATOR}"
            )
        );
    }

    #[test]
    fn test_attachments_ignored_when_not_summarizing() {
        let mut t = turn("user", "please read this");
        t.attachments = vec![attachment(Some("first doc"))];

        let messages = translate_turns(&[t], false).unwrap();
        assert_eq!(messages[0], ChatMessage::user("please read this"));
    }

    #[test]
    fn test_missing_parsed_content_is_empty() {
        let prompt = summarize_prompt(&[attachment(None)]);
        assert_eq!(
            prompt,
            format!("{SUMMARY_PREAMBLE}\n{ATTACHMENT_SEPARATOR}\n\n{ATTACHMENT_SEPARATOR}")
        );
    }

    #[test]
    fn test_system_and_bot_attachments_untouched() {
        let mut t = turn("bot", "reply");
        t.attachments = vec![attachment(Some("doc"))];
        let messages = translate_turns(&[t], true).unwrap();
        assert_eq!(messages[0], ChatMessage::assistant("reply"));
    }

    #[test]
    fn test_unrecognized_role_fails() {
        let turns = vec![turn("user", "Hi"), turn("tool", "{}")];
        let err = translate_turns(&turns, false).unwrap_err();
        assert_eq!(err, TranslateError::UnrecognizedRole("tool".to_string()));
    }

    #[test]
    fn test_request_parameters() {
        let req = poe_to_openai(&[turn("user", "Hi")], &config(false)).unwrap();
        assert_eq!(req.model, "kimi-k2-0711-preview");
        assert!(req.stream);
        assert_eq!(req.max_tokens, 16_000);
        assert!((req.temperature - 1.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 16_000);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_empty_history() {
        let req = poe_to_openai(&[], &config(true)).unwrap();
        assert!(req.messages.is_empty());
    }
}

//! Prompt construction for both answering modes

use super::question::QuestionRecord;
use crate::llm::ChatMessage;

/// `"A: text\n"` per option
fn options_text(options: &[(String, String)]) -> String {
    options
        .iter()
        .map(|(key, value)| format!("{}: {}\n", key, value))
        .collect()
}

fn options_list(options: &[(String, String)]) -> String {
    options
        .iter()
        .map(|(key, _)| key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// User message for agent mode: the question, its options, and a nudge to
/// use the tools before answering
pub fn agent_prompt(question: &QuestionRecord) -> String {
    format!(
        "Question: {}\n\nOptions:\n{}\n\nINSTRUCTIONS: If this question involves cancer/genes/proteins, USE TOOLS IMMEDIATELY. Answer with <answer>[letter]</answer>",
        question.question,
        options_text(&question.options())
    )
}

/// System and user messages for direct (tool-free) answering
pub fn direct_messages(question: &QuestionRecord) -> Vec<ChatMessage> {
    let options = question.options();
    let letters = options_list(&options);

    vec![
        ChatMessage::system(format!(
            "You are a biology expert. Answer the following multiple choice questions by selecting the correct option ({}) and providing a brief explanation. Always format your answer as <answer>[letter]</answer>.",
            letters
        )),
        ChatMessage::user(format!(
            "Question: {}\n\nOptions:\n{}\nPlease provide your answer as a single letter ({}).\nFormat your answer as: <answer>[letter]</answer>\n\nAnswer:",
            question.question,
            options_text(&options),
            letters
        )),
    ]
}

/// Render messages with the ChatML template used by Qwen models, ending
/// with an open assistant turn
pub fn render_chatml(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str("<|im_start|>");
        prompt.push_str(&message.role);
        prompt.push('\n');
        prompt.push_str(message.text());
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

/// Completion prompt for direct mode
pub fn direct_prompt(question: &QuestionRecord) -> String {
    render_chatml(&direct_messages(question))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question() -> QuestionRecord {
        QuestionRecord::new(
            "Which gene is most frequently mutated in melanoma?",
            json!({"A": "BRAF", "B": "EGFR"}),
        )
    }

    #[test]
    fn test_agent_prompt_layout() {
        assert_eq!(
            agent_prompt(&question()),
            "Question: Which gene is most frequently mutated in melanoma?\n\n\
             Options:\nA: BRAF\nB: EGFR\n\n\n\
             INSTRUCTIONS: If this question involves cancer/genes/proteins, USE TOOLS IMMEDIATELY. \
             Answer with <answer>[letter]</answer>"
        );
    }

    #[test]
    fn test_agent_prompt_with_string_options() {
        let q = QuestionRecord::new("Q?", json!(r#"{"A": "x"}"#));
        assert!(agent_prompt(&q).contains("Options:\nA: x\n"));
    }

    #[test]
    fn test_direct_messages_list_letters() {
        let messages = direct_messages(&question());
        assert_eq!(messages.len(), 2);
        assert!(messages[0].text().contains("selecting the correct option (A, B)"));
        assert!(messages[1].text().ends_with("single letter (A, B).\nFormat your answer as: <answer>[letter]</answer>\n\nAnswer:"));
    }

    #[test]
    fn test_chatml_rendering() {
        let prompt = render_chatml(&[ChatMessage::system("S"), ChatMessage::user("U")]);
        assert_eq!(
            prompt,
            "<|im_start|>system\nS<|im_end|>\n<|im_start|>user\nU<|im_end|>\n<|im_start|>assistant\n"
        );
    }
}

//! Input and output records
//!
//! Everything except `question` is kept in `fields` exactly as read, nulls
//! and unexpected types included, so an output line is its input line plus
//! `raw_response` and `answer_letter`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Answer letter written when no option could be extracted
pub const NO_ANSWER: &str = "X";

const RESPONSE_KEY: &str = "raw_response";
const LETTER_KEY: &str = "answer_letter";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    /// `id`, `options`, `type`, `metadata`, `dataset` and any other input keys
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl QuestionRecord {
    pub fn new(question: impl Into<String>, options: Value) -> Self {
        let mut fields = Map::new();
        fields.insert("options".to_string(), options);
        Self {
            question: question.into(),
            fields,
        }
    }

    pub fn with_id(mut self, id: Value) -> Self {
        self.fields.insert("id".to_string(), id);
        self
    }

    pub fn id(&self) -> Option<&Value> {
        self.fields.get("id")
    }

    /// `type` as given, if it is a string
    pub fn question_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.fields.get("metadata")
    }

    pub fn dataset(&self) -> Option<&str> {
        self.fields.get("dataset").and_then(Value::as_str)
    }

    /// Options as `(letter, text)` pairs in key order.
    ///
    /// `options` is a `{letter: text}` object or a string holding one;
    /// anything else means no options.
    pub fn options(&self) -> Vec<(String, String)> {
        let parsed;
        let map = match self.fields.get("options") {
            Some(Value::Object(map)) => map,
            Some(Value::String(raw)) => match serde_json::from_str::<Map<String, Value>>(raw) {
                Ok(map) => {
                    parsed = map;
                    &parsed
                }
                Err(_) => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        map.iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect()
    }

    /// Id for log messages
    pub fn display_id(&self) -> String {
        match self.id() {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "unknown".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(flatten)]
    pub question: QuestionRecord,
    pub raw_response: String,
    pub answer_letter: String,
}

impl AnswerRecord {
    pub fn answered(question: QuestionRecord, raw_response: String, letter: String) -> Self {
        Self {
            question: without_answer_keys(question),
            raw_response,
            answer_letter: letter,
        }
    }

    /// Record for a question that failed: `Error: <message>` / `X`
    pub fn failed(question: QuestionRecord, error: impl std::fmt::Display) -> Self {
        Self {
            question: without_answer_keys(question),
            raw_response: format!("Error: {}", error),
            answer_letter: NO_ANSWER.to_string(),
        }
    }

    pub fn has_answer(&self) -> bool {
        self.answer_letter != NO_ANSWER
    }
}

/// Input keys named like the answer fields are overwritten, not duplicated
fn without_answer_keys(mut question: QuestionRecord) -> QuestionRecord {
    question.fields.remove(RESPONSE_KEY);
    question.fields.remove(LETTER_KEY);
    question
}

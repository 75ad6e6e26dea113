//! Schema registry: the static per-mode generation contract.
//!
//! Every mode resolves to an item shape, the fixed-length array shape the
//! complete result must satisfy, and the prompt pair sent to the model.
//! `resolve` is total over `Mode`; unknown mode strings never get this far
//! because `Mode` is parsed at the boundary.

use serde_json::{json, Value};

use crate::config::ITEMS_PER_SET;
use crate::models::{AnswerLetter, Mode};

const QUIZ_SYSTEM_PROMPT: &str = "You are a teacher. Your job is to take a document, and create a multiple choice test (with 4 questions) based on the content of the document. Each option should be roughly equal in length.";
const QUIZ_USER_PROMPT: &str = "Create a multiple choice test based on this document.";

const FLASHCARD_SYSTEM_PROMPT: &str = "You are a teacher. Your job is to take a document and create exactly 4 flashcards based on its content, each with a question on the front, a clear and concise answer on the back, and a hint. Keep the questions concise and the answers clear.";
const FLASHCARD_USER_PROMPT: &str = "Extract key facts and create flashcards from this document.";

const MATCH_SYSTEM_PROMPT: &str = "You are an AI that extracts question-answer pairs for a matching game. Given a document, extract only 4 unique questions and their correct answers. Ensure the questions and answers are concise and logically paired.";
const MATCH_USER_PROMPT: &str = "Generate a matching pairs game based on this document.";

/// Options on every quiz question.
pub const QUIZ_OPTION_COUNT: usize = 4;

/// Structural contract of one generated element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemShape {
    Quiz,
    Flashcard,
    Match,
}

impl ItemShape {
    /// Fields that must be present (and non-empty) on every item.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Quiz => &["question", "options", "answer"],
            Self::Flashcard => &["front", "back"],
            Self::Match => &["question", "answer"],
        }
    }

    /// Response schema for one item, in the OpenAPI subset Gemini accepts.
    pub fn response_schema(&self) -> Value {
        match self {
            Self::Quiz => json!({
                "type": "OBJECT",
                "properties": {
                    "question": { "type": "STRING" },
                    "options": {
                        "type": "ARRAY",
                        "items": { "type": "STRING" },
                        "minItems": QUIZ_OPTION_COUNT,
                        "maxItems": QUIZ_OPTION_COUNT,
                        "description": "Four possible answers to the question. Only one should be correct. They should all be of equal lengths."
                    },
                    "answer": {
                        "type": "STRING",
                        "enum": AnswerLetter::ALL.iter().map(|l| l.as_str()).collect::<Vec<_>>(),
                        "description": "The correct answer, where A is the first option, B is the second, and so on."
                    }
                },
                "required": self.required_fields(),
            }),
            Self::Flashcard => json!({
                "type": "OBJECT",
                "properties": {
                    "front": {
                        "type": "STRING",
                        "description": "The question, term, or prompt on the front of the flashcard."
                    },
                    "back": {
                        "type": "STRING",
                        "description": "The answer or explanation on the back of the flashcard."
                    },
                    "hint": {
                        "type": "STRING",
                        "description": "A hint to help answer the flashcard."
                    }
                },
                "required": self.required_fields(),
            }),
            Self::Match => json!({
                "type": "OBJECT",
                "properties": {
                    "question": {
                        "type": "STRING",
                        "description": "A question or prompt that needs to be matched."
                    },
                    "answer": {
                        "type": "STRING",
                        "description": "The corresponding correct answer to the question."
                    }
                },
                "required": self.required_fields(),
            }),
        }
    }
}

/// A complete result: exactly `len` items of `item` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayShape {
    pub item: ItemShape,
    pub len: usize,
}

impl ArrayShape {
    pub fn response_schema(&self) -> Value {
        json!({
            "type": "ARRAY",
            "items": self.item.response_schema(),
            "minItems": self.len,
            "maxItems": self.len,
        })
    }
}

/// Everything the handler needs to run one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeConfig {
    pub mode: Mode,
    pub item_shape: ItemShape,
    pub array_shape: ArrayShape,
    pub system_prompt: &'static str,
    pub user_prompt: &'static str,
}

/// Resolve the generation contract for a mode.
pub fn resolve(mode: Mode) -> ModeConfig {
    let (item_shape, system_prompt, user_prompt) = match mode {
        Mode::NormalQuiz | Mode::Learn => (ItemShape::Quiz, QUIZ_SYSTEM_PROMPT, QUIZ_USER_PROMPT),
        Mode::FlashCard => (
            ItemShape::Flashcard,
            FLASHCARD_SYSTEM_PROMPT,
            FLASHCARD_USER_PROMPT,
        ),
        Mode::Match => (ItemShape::Match, MATCH_SYSTEM_PROMPT, MATCH_USER_PROMPT),
    };

    ModeConfig {
        mode,
        item_shape,
        array_shape: ArrayShape {
            item: item_shape,
            len: ITEMS_PER_SET,
        },
        system_prompt,
        user_prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_modes_share_shape_and_prompts() {
        let quiz = resolve(Mode::NormalQuiz);
        let learn = resolve(Mode::Learn);
        assert_eq!(quiz.item_shape, ItemShape::Quiz);
        assert_eq!(learn.item_shape, ItemShape::Quiz);
        assert_eq!(quiz.system_prompt, learn.system_prompt);
        assert_eq!(quiz.user_prompt, learn.user_prompt);
    }

    #[test]
    fn every_mode_requires_four_items() {
        for mode in Mode::ALL {
            let config = resolve(*mode);
            assert_eq!(config.mode, *mode);
            assert_eq!(config.array_shape.len, 4);
            assert_eq!(config.array_shape.item, config.item_shape);
            assert!(!config.system_prompt.is_empty());
            assert!(!config.user_prompt.is_empty());
        }
    }

    #[test]
    fn flashcard_and_match_have_distinct_shapes() {
        assert_eq!(resolve(Mode::FlashCard).item_shape, ItemShape::Flashcard);
        assert_eq!(resolve(Mode::Match).item_shape, ItemShape::Match);
    }

    #[test]
    fn flashcard_hint_is_optional_in_schema() {
        let schema = ItemShape::Flashcard.response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["front", "back"]);
        assert!(schema["properties"]["hint"].is_object());
    }

    #[test]
    fn quiz_schema_enumerates_answer_letters() {
        let schema = ItemShape::Quiz.response_schema();
        assert_eq!(
            schema["properties"]["answer"]["enum"],
            json!(["A", "B", "C", "D"])
        );
    }

    #[test]
    fn array_schema_wraps_item_schema() {
        let config = resolve(Mode::Match);
        let schema = config.array_shape.response_schema();
        assert_eq!(schema["type"], "ARRAY");
        assert_eq!(schema["items"], ItemShape::Match.response_schema());
    }

    #[test]
    fn lengths_are_pinned_in_schema() {
        let schema = resolve(Mode::NormalQuiz).array_shape.response_schema();
        assert_eq!(schema["minItems"], 4);
        assert_eq!(schema["maxItems"], 4);
        let options = &schema["items"]["properties"]["options"];
        assert_eq!(options["minItems"], 4);
        assert_eq!(options["maxItems"], 4);
    }
}

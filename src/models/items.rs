use serde::{Deserialize, Serialize};

use super::enums::AnswerLetter;

/// Multiple-choice question, shared by `normalQuiz` and `learn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    /// Exactly four options; enforced by validation, not by the type.
    pub options: Vec<String>,
    pub answer: AnswerLetter,
}

impl QuizItem {
    /// The option text the answer letter points at.
    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.answer.index()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardItem {
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// One question/answer pair of a matching game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchItem {
    pub question: String,
    pub answer: String,
}

/// One generated element of any mode.
///
/// Serialized without a tag so the wire carries the bare item shape.
/// Never deserialized generically: a match pair is a prefix of a quiz
/// item's fields, so decoding always goes through the mode's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StudyItem {
    Quiz(QuizItem),
    Flashcard(FlashcardItem),
    Match(MatchItem),
}

impl StudyItem {
    pub fn as_quiz(&self) -> Option<&QuizItem> {
        match self {
            Self::Quiz(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_flashcard(&self) -> Option<&FlashcardItem> {
        match self {
            Self::Flashcard(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_match(&self) -> Option<&MatchItem> {
        match self {
            Self::Match(item) => Some(item),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_option_follows_letter() {
        let item = QuizItem {
            question: "2 + 2?".into(),
            options: vec!["3".into(), "4".into(), "5".into(), "22".into()],
            answer: AnswerLetter::B,
        };
        assert_eq!(item.correct_option(), Some("4"));
    }

    #[test]
    fn correct_option_none_when_options_short() {
        let item = QuizItem {
            question: "?".into(),
            options: vec!["only".into()],
            answer: AnswerLetter::C,
        };
        assert_eq!(item.correct_option(), None);
    }

    #[test]
    fn flashcard_hint_omitted_when_absent() {
        let item = StudyItem::Flashcard(FlashcardItem {
            front: "Mitochondria".into(),
            back: "Powerhouse of the cell".into(),
            hint: None,
        });
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"front": "Mitochondria", "back": "Powerhouse of the cell"})
        );
    }

    #[test]
    fn untagged_serialization_is_bare_shape() {
        let item = StudyItem::Match(MatchItem {
            question: "Capital of France".into(),
            answer: "Paris".into(),
        });
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["question"], "Capital of France");
        assert_eq!(json["answer"], "Paris");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn accessors_match_variant() {
        let item = StudyItem::Match(MatchItem {
            question: "q".into(),
            answer: "a".into(),
        });
        assert!(item.as_match().is_some());
        assert!(item.as_quiz().is_none());
        assert!(item.as_flashcard().is_none());
    }
}

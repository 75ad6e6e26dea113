// Item and array shape validation for model output.
// Partial streams use `decode_prefix` (leading well-formed items only);
// the final collection goes through `validate_array`, which reports every
// problem instead of stopping at the first.
// Required text fields must contain something other than whitespace.
// Optional fields keep whatever string the model sent, empty included.

use serde_json::Value;

use super::partial::Element;
use super::schema::{ArrayShape, ItemShape, QUIZ_OPTION_COUNT};
use crate::models::{AnswerLetter, FlashcardItem, MatchItem, QuizItem, StudyItem};

/// Decode one element into the item shape, collecting every field problem.
pub fn decode_item(
    shape: ItemShape,
    index: usize,
    value: &Value,
) -> Result<StudyItem, Vec<String>> {
    let Some(object) = value.as_object() else {
        return Err(vec![format!("[{index}]: expected an object")]);
    };

    let mut problems = Vec::new();
    let mut text = |field: &str, required: bool| -> Option<String> {
        match object.get(field) {
            Some(Value::String(s)) if !required || !s.trim().is_empty() => Some(s.clone()),
            Some(Value::String(_)) => {
                problems.push(format!("[{index}].{field}: must not be empty"));
                None
            }
            None | Some(Value::Null) if !required => None,
            None | Some(Value::Null) => {
                problems.push(format!("[{index}].{field}: required"));
                None
            }
            Some(_) => {
                problems.push(format!("[{index}].{field}: expected a string"));
                None
            }
        }
    };

    let item = match shape {
        ItemShape::Quiz => {
            let question = text("question", true);
            let answer = text("answer", true);
            let options = quiz_options(index, object.get("options"), &mut problems);
            let answer = answer.and_then(|a| match a.parse::<AnswerLetter>() {
                Ok(letter) => Some(letter),
                Err(_) => {
                    problems.push(format!("[{index}].answer: expected one of A, B, C, D"));
                    None
                }
            });
            match (question, options, answer) {
                (Some(question), Some(options), Some(answer)) => Some(StudyItem::Quiz(QuizItem {
                    question,
                    options,
                    answer,
                })),
                _ => None,
            }
        }
        ItemShape::Flashcard => {
            let front = text("front", true);
            let back = text("back", true);
            let hint = text("hint", false);
            match (front, back) {
                (Some(front), Some(back)) => {
                    Some(StudyItem::Flashcard(FlashcardItem { front, back, hint }))
                }
                _ => None,
            }
        }
        ItemShape::Match => {
            let question = text("question", true);
            let answer = text("answer", true);
            match (question, answer) {
                (Some(question), Some(answer)) => {
                    Some(StudyItem::Match(MatchItem { question, answer }))
                }
                _ => None,
            }
        }
    };

    match item {
        Some(item) if problems.is_empty() => Ok(item),
        _ => Err(problems),
    }
}

fn quiz_options(
    index: usize,
    value: Option<&Value>,
    problems: &mut Vec<String>,
) -> Option<Vec<String>> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        problems.push(format!("[{index}].options: required"));
        return None;
    };
    let Some(array) = value.as_array() else {
        problems.push(format!("[{index}].options: expected an array"));
        return None;
    };
    if array.len() != QUIZ_OPTION_COUNT {
        problems.push(format!(
            "[{index}].options: Array must contain exactly {QUIZ_OPTION_COUNT} element(s), got {}",
            array.len()
        ));
        return None;
    }
    let options: Vec<String> = array
        .iter()
        .filter_map(|o| o.as_str().filter(|s| !s.trim().is_empty()).map(str::to_string))
        .collect();
    if options.len() != QUIZ_OPTION_COUNT {
        problems.push(format!("[{index}].options: every option must be a non-empty string"));
        return None;
    }
    Some(options)
}

/// Leading run of well-formed items, capped at `limit`.
///
/// Stops at the first malformed element so the result is always a prefix
/// of the eventual collection.
pub fn decode_prefix(shape: ItemShape, elements: &[Element], limit: usize) -> Vec<StudyItem> {
    let mut items = Vec::with_capacity(limit.min(elements.len()));
    for (index, element) in elements.iter().take(limit).enumerate() {
        let Element::Value(value) = element else {
            break;
        };
        match decode_item(shape, index, value) {
            Ok(item) => items.push(item),
            Err(_) => break,
        }
    }
    items
}

/// Validate the complete collection against the array shape.
pub fn validate_array(
    shape: ArrayShape,
    elements: &[Element],
) -> Result<Vec<StudyItem>, Vec<String>> {
    let mut problems = Vec::new();
    if elements.len() != shape.len {
        problems.push(format!(
            "Array must contain exactly {} element(s), got {}",
            shape.len,
            elements.len()
        ));
    }

    let mut items = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        match element {
            Element::Value(value) => match decode_item(shape.item, index, value) {
                Ok(item) => items.push(item),
                Err(mut item_problems) => problems.append(&mut item_problems),
            },
            Element::Malformed { index, error } => {
                problems.push(format!("[{index}]: invalid JSON ({error})"));
            }
        }
    }

    if problems.is_empty() {
        Ok(items)
    } else {
        Err(problems)
    }
}

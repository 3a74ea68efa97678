use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

fn default_points() -> u32 {
    1
}

/// Correctness data per question variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<ChoiceOption>,
        correct_option_id: String,
    },
    ShortAnswer {
        expected_answer: String,
    },
    TrueFalse {
        correct_answer: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
}

/// A learner's answer. `Text` carries either the selected option id
/// (multiple choice) or free text (short answer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Text(String),
}

impl Question {
    pub fn multiple_choice(
        id: impl Into<String>,
        text: impl Into<String>,
        points: u32,
        options: &[(&str, &str)],
        correct_option_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            points,
            kind: QuestionKind::MultipleChoice {
                options: options
                    .iter()
                    .map(|(id, text)| ChoiceOption {
                        id: id.to_string(),
                        text: text.to_string(),
                    })
                    .collect(),
                correct_option_id: correct_option_id.into(),
            },
        }
    }

    pub fn short_answer(
        id: impl Into<String>,
        text: impl Into<String>,
        points: u32,
        expected_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            points,
            kind: QuestionKind::ShortAnswer {
                expected_answer: expected_answer.into(),
            },
        }
    }

    pub fn true_false(
        id: impl Into<String>,
        text: impl Into<String>,
        points: u32,
        correct_answer: bool,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            points,
            kind: QuestionKind::TrueFalse { correct_answer },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_json_uses_type_tag() {
        let raw = serde_json::json!({
            "id": "q1",
            "text": "Capital of France?",
            "points": 2,
            "type": "short_answer",
            "expected_answer": "Paris"
        });
        let question: Question = serde_json::from_value(raw).unwrap();
        assert_eq!(question.points, 2);
        assert!(matches!(question.kind, QuestionKind::ShortAnswer { ref expected_answer } if expected_answer == "Paris"));
    }

    #[test]
    fn answer_value_is_untagged() {
        let flag: AnswerValue = serde_json::from_str("true").unwrap();
        let text: AnswerValue = serde_json::from_str("\"opt-b\"").unwrap();
        assert_eq!(flag, AnswerValue::Flag(true));
        assert_eq!(text, AnswerValue::Text("opt-b".into()));
    }
}

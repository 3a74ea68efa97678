use std::collections::HashMap;

use crate::models::question::{AnswerValue, Question, QuestionKind};
use crate::models::test_attempt::ScoredAnswer;

#[derive(Debug, Clone, PartialEq)]
pub struct GradeSummary {
    pub answers: Vec<ScoredAnswer>,
    pub points_awarded: u32,
    pub max_possible_points: u32,
    pub score_percentage: u32,
}

pub struct GradingService;

impl GradingService {
    /// Scores every question of the frozen question set, answered or not.
    /// Totals saturate at `u32::MAX`.
    pub fn grade(questions: &[Question], answers: &HashMap<String, AnswerValue>) -> GradeSummary {
        let mut max_possible_points: u32 = 0;
        let mut points_awarded: u32 = 0;
        let mut scored = Vec::with_capacity(questions.len());

        for q in questions {
            max_possible_points = max_possible_points.saturating_add(q.points);
            let raw_answer = answers.get(&q.id).cloned();
            let is_correct = raw_answer
                .as_ref()
                .map(|a| Self::is_correct(q, a))
                .unwrap_or(false);
            let points = if is_correct { q.points } else { 0 };
            points_awarded = points_awarded.saturating_add(points);

            scored.push(ScoredAnswer {
                question_id: q.id.clone(),
                raw_answer,
                is_correct,
                points_awarded: points,
            });
        }

        GradeSummary {
            answers: scored,
            points_awarded,
            max_possible_points,
            score_percentage: Self::percentage(points_awarded, max_possible_points),
        }
    }

    pub fn is_correct(question: &Question, answer: &AnswerValue) -> bool {
        match (&question.kind, answer) {
            (QuestionKind::MultipleChoice { correct_option_id, .. }, AnswerValue::Text(selected)) => {
                selected == correct_option_id
            }
            (QuestionKind::ShortAnswer { expected_answer }, AnswerValue::Text(given)) => {
                given.trim().to_lowercase() == expected_answer.trim().to_lowercase()
            }
            (QuestionKind::TrueFalse { correct_answer }, AnswerValue::Flag(given)) => {
                given == correct_answer
            }
            _ => false,
        }
    }

    pub fn percentage(points_awarded: u32, max_possible_points: u32) -> u32 {
        if max_possible_points == 0 {
            return 0;
        }
        (100.0 * points_awarded as f64 / max_possible_points as f64).round() as u32
    }
}

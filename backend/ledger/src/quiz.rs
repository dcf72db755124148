//! # Quiz Scoring
//!
//! Quizzes are read-only once published. A user may submit each one once while it is open;
//! every correct answer is worth `pointsPerQuestion`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::LedgerError,
    models::{Difficulty, Quiz, QuizCategory, QuizType},
};

#[derive(Clone, Debug, Deserialize)]
pub struct QuizSubmission {
    pub answers: Vec<Option<usize>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub correct: bool,
    pub correct_answer: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub quiz_id: String,
    pub correct_answers: u64,
    pub total_questions: u64,
    pub points_earned: u64,
    pub questions: Vec<QuestionOutcome>,
}

/// Republishing is accepted only when nothing changed.
pub fn ensure_unchanged(stored: &Quiz, incoming: &Quiz) -> Result<(), LedgerError> {
    if stored == incoming {
        Ok(())
    } else {
        Err(LedgerError::QuizAlreadyPublished(stored.id.clone()))
    }
}

pub fn score_quiz(
    quiz: &Quiz,
    answers: &[Option<usize>],
    now: DateTime<Utc>,
) -> Result<QuizScore, LedgerError> {
    if !quiz.is_open(now) {
        return Err(LedgerError::QuizNotActive(quiz.id.clone()));
    }
    if answers.len() != quiz.questions.len() {
        return Err(LedgerError::InvalidAnswers {
            expected: quiz.questions.len(),
            got: answers.len(),
        });
    }

    let questions: Vec<QuestionOutcome> = quiz
        .questions
        .iter()
        .zip(answers)
        .map(|(question, answer)| QuestionOutcome {
            correct: *answer == Some(question.correct_answer),
            correct_answer: question.correct_answer,
            explanation: question.explanation.clone(),
        })
        .collect();

    let correct_answers = questions.iter().filter(|outcome| outcome.correct).count() as u64;

    Ok(QuizScore {
        quiz_id: quiz.id.clone(),
        correct_answers,
        total_questions: questions.len() as u64,
        points_earned: correct_answers.saturating_mul(quiz.points_per_question),
        questions,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// What players see before submitting: no answers, no explanations.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub quiz_type: QuizType,
    pub questions: Vec<PublicQuestion>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub points_per_question: u64,
    pub difficulty: Difficulty,
    pub category: QuizCategory,
}

impl From<Quiz> for PublicQuiz {
    fn from(quiz: Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title,
            quiz_type: quiz.quiz_type,
            questions: quiz
                .questions
                .into_iter()
                .map(|question| PublicQuestion {
                    question: question.question,
                    options: question.options,
                    image_url: question.image_url,
                })
                .collect(),
            start_date: quiz.start_date,
            end_date: quiz.end_date,
            points_per_question: quiz.points_per_question,
            difficulty: quiz.difficulty,
            category: quiz.category,
        }
    }
}

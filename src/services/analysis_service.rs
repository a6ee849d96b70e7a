use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::exam::Question;
use crate::models::exam_result::{ExamResult, StudentAnswer};
use crate::services::psychometrics::{
    analyze, AnalysisOptions, AnalysisResult, ItemAnswer, StudentSample,
};

/// Read-only orchestrator: loads an exam's persisted responses and feeds
/// them to the pure analyzer.
#[derive(Clone)]
pub struct AnalysisService {
    pool: PgPool,
}

impl AnalysisService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn analyze_exam(
        &self,
        exam_id: Uuid,
        options: AnalysisOptions,
    ) -> Result<AnalysisResult> {
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT id, exam_id, position, question_type, prompt, options,
                      correct_answer, points, difficulty, topic
               FROM questions WHERE exam_id = $1 ORDER BY position"#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        if questions.is_empty() {
            return Err(Error::Validation("no exam questions found".to_string()));
        }

        let samples = self.load_samples(exam_id).await?;
        analyze(&questions, &samples, &options)
    }

    /// One sample per student. Re-uploads append result rows, so the most
    /// recently persisted result per student wins here.
    async fn load_samples(&self, exam_id: Uuid) -> Result<Vec<StudentSample>> {
        let results = sqlx::query_as::<_, ExamResult>(
            r#"SELECT id, exam_id, student_id, student_name, term_id, course_id,
                      variant_code, score, total_points, percentage, upload_token, created_at
               FROM exam_results WHERE exam_id = $1 ORDER BY created_at"#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_student: HashMap<String, StudentSample> = HashMap::new();
        for result in results {
            let answers = sqlx::query_as::<_, StudentAnswer>(
                r#"SELECT id, result_id, question_id, answer, selected_option, is_correct, points
                   FROM student_answers WHERE result_id = $1"#,
            )
            .bind(result.id)
            .fetch_all(&self.pool)
            .await?;

            let sample = StudentSample {
                student_id: result.student_id.clone(),
                total_score: result.score as f64,
                answers: answers
                    .into_iter()
                    .map(|a| {
                        (
                            a.question_id,
                            ItemAnswer {
                                answer: a.answer,
                                selected_option: a.selected_option,
                                is_correct: a.is_correct,
                                points: a.points as f64,
                            },
                        )
                    })
                    .collect(),
            };
            by_student.insert(result.student_id, sample);
        }

        let mut samples: Vec<StudentSample> = by_student.into_values().collect();
        samples.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(samples)
    }
}

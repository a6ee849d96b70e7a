use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::exam_result::ExamResult;
use crate::services::ingest_service::StudentScore;

/// Precondition gate for a score batch. Runs before any transaction is
/// opened; a violation leaves the database untouched.
pub fn validate_batch(scores: &[StudentScore], total_points: i32) -> Result<()> {
    if total_points <= 0 {
        return Err(Error::Precondition(
            "total points must be a positive number".to_string(),
        ));
    }
    for score in scores {
        if score.variant_code.trim().is_empty() {
            return Err(Error::Precondition(format!(
                "missing variant code for student {}",
                score.student_id
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedResult {
    pub id: Uuid,
    pub student_id: String,
    pub score: i32,
    pub total_points: i32,
    pub variant_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub count: usize,
    pub saved_results: Vec<SavedResult>,
    /// True when an upload token matched an already-persisted batch and the
    /// existing records were returned instead of appending.
    pub replayed: bool,
}

#[derive(Clone)]
pub struct ScoreService {
    pool: PgPool,
}

impl ScoreService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a scored batch atomically: every student's result and answer
    /// rows commit together or not at all.
    ///
    /// When `upload_token` is given and a batch with that token already
    /// exists for the exam, the call is an idempotent replay and returns
    /// the original records untouched.
    pub async fn save_scores(
        &self,
        exam_id: Uuid,
        term_id: &str,
        course_id: &str,
        scores: &[StudentScore],
        total_points: i32,
        upload_token: Option<&str>,
    ) -> Result<SaveOutcome> {
        validate_batch(scores, total_points)?;

        if let Some(token) = upload_token {
            let existing = sqlx::query_as::<_, ExamResult>(
                r#"SELECT id, exam_id, student_id, student_name, term_id, course_id,
                          variant_code, score, total_points, percentage, upload_token, created_at
                   FROM exam_results
                   WHERE exam_id = $1 AND upload_token = $2
                   ORDER BY created_at"#,
            )
            .bind(exam_id)
            .bind(token)
            .fetch_all(&self.pool)
            .await?;

            if !existing.is_empty() {
                tracing::info!(
                    "Upload token '{}' for exam {} already persisted, replaying {} results",
                    token,
                    exam_id,
                    existing.len()
                );
                return Ok(SaveOutcome {
                    count: existing.len(),
                    saved_results: existing
                        .into_iter()
                        .map(|r| SavedResult {
                            id: r.id,
                            student_id: r.student_id,
                            score: r.score,
                            total_points: r.total_points,
                            variant_code: r.variant_code,
                        })
                        .collect(),
                    replayed: true,
                });
            }
        }

        let mut tx = self.pool.begin().await?;
        let mut saved_results = Vec::with_capacity(scores.len());

        for score in scores {
            let result_id = Uuid::new_v4();
            sqlx::query(
                r#"INSERT INTO exam_results
                       (id, exam_id, student_id, student_name, term_id, course_id,
                        variant_code, score, total_points, percentage, upload_token)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
            )
            .bind(result_id)
            .bind(exam_id)
            .bind(&score.student_id)
            .bind(&score.student_name)
            .bind(term_id)
            .bind(course_id)
            .bind(&score.variant_code)
            .bind(score.total_score)
            .bind(total_points)
            .bind(score.percentage)
            .bind(upload_token)
            .execute(&mut *tx)
            .await?;

            for detail in &score.details {
                sqlx::query(
                    r#"INSERT INTO student_answers
                           (id, result_id, question_id, answer, selected_option, is_correct, points)
                       VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
                )
                .bind(Uuid::new_v4())
                .bind(result_id)
                .bind(detail.question_id)
                .bind(&detail.answer)
                .bind(&detail.selected_option)
                .bind(detail.is_correct)
                .bind(detail.points)
                .execute(&mut *tx)
                .await?;
            }

            saved_results.push(SavedResult {
                id: result_id,
                student_id: score.student_id.clone(),
                score: score.total_score,
                total_points,
                variant_code: score.variant_code.clone(),
            });
        }

        tx.commit().await?;
        tracing::info!(
            "Persisted {} exam results for exam {} (term {}, course {})",
            saved_results.len(),
            exam_id,
            term_id,
            course_id
        );

        Ok(SaveOutcome {
            count: saved_results.len(),
            saved_results,
            replayed: false,
        })
    }

    pub async fn list_results(&self, exam_id: Uuid) -> Result<Vec<ExamResult>> {
        let results = sqlx::query_as::<_, ExamResult>(
            r#"SELECT id, exam_id, student_id, student_name, term_id, course_id,
                      variant_code, score, total_points, percentage, upload_token, created_at
               FROM exam_results WHERE exam_id = $1 ORDER BY created_at"#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }
}

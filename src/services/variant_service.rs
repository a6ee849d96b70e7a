use crate::error::{Error, Result};
use crate::models::exam::{Exam, Question, QuestionType};
use crate::models::generation::{status, Generation, GenerationConfig, Variant};
use crate::utils::codes::variant_code;
use rand::seq::SliceRandom;
use rand::thread_rng;
use sqlx::PgPool;
use uuid::Uuid;

/// Build every variant of a generation in memory.
///
/// Question order is a uniformly random permutation of canonical indices
/// when `randomize_question_order` is set, otherwise identity (canonical
/// order is itself a valid, unshuffled baseline form). Each question's
/// option order is drawn independently under the flag that applies to its
/// type. Nothing is observable until the whole list is returned.
pub fn build_variants(
    generation_id: Uuid,
    questions: &[Question],
    config: &GenerationConfig,
) -> Result<Vec<Variant>> {
    if questions.is_empty() {
        return Err(Error::Precondition("exam has no questions".to_string()));
    }
    if config.number_of_variants < 1 {
        return Err(Error::Precondition(
            "number of variants must be at least 1".to_string(),
        ));
    }

    let mut rng = thread_rng();
    let mut variants = Vec::with_capacity(config.number_of_variants as usize);

    for number in 1..=config.number_of_variants {
        let mut question_order: Vec<i32> = (0..questions.len() as i32).collect();
        if config.randomize_question_order {
            question_order.shuffle(&mut rng);
        }

        // option_orders[c] is the permutation for the question at canonical
        // index c, regardless of where that question lands in this variant.
        let mut option_orders = Vec::with_capacity(questions.len());
        for question in questions {
            let mut order: Vec<i32> = (0..question.options.len() as i32).collect();
            let randomize = match question.kind() {
                Some(QuestionType::MultipleChoice) => config.randomize_option_order,
                Some(QuestionType::TrueFalse) => config.randomize_true_false,
                None => false,
            };
            if randomize {
                order.shuffle(&mut rng);
            }
            option_orders.push(order);
        }

        variants.push(Variant {
            id: Uuid::new_v4(),
            generation_id,
            variant_number: number,
            variant_code: variant_code(number),
            question_order,
            option_orders: sqlx::types::Json(option_orders),
            created_at: None,
        });
    }

    Ok(variants)
}

#[derive(Clone)]
pub struct VariantService {
    pool: PgPool,
}

impl VariantService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load_exam(&self, exam_id: Uuid) -> Result<Exam> {
        let exam = sqlx::query_as::<_, Exam>(
            r#"SELECT id, title, total_points, created_at FROM exams WHERE id = $1"#,
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Exam {} not found", exam_id)))?;
        Ok(exam)
    }

    /// Canonical question list, in stable `position` order.
    pub async fn load_questions(&self, exam_id: Uuid) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT id, exam_id, position, question_type, prompt, options,
                      correct_answer, points, difficulty, topic
               FROM questions WHERE exam_id = $1 ORDER BY position"#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    /// Generate and persist a full batch of variants for an exam.
    ///
    /// All permutations are built before the transaction opens, and the
    /// Generation plus every Variant commit together — a partially
    /// generated batch is never observable. If the insert fails, the
    /// transaction rolls back and a FAILED generation row is recorded for
    /// audit (best effort).
    pub async fn create_generation(
        &self,
        exam_id: Uuid,
        config: GenerationConfig,
    ) -> Result<(Generation, Vec<Variant>)> {
        let exam = self.load_exam(exam_id).await?;
        let questions = self.load_questions(exam_id).await?;

        let generation_id = Uuid::new_v4();
        let variants = build_variants(generation_id, &questions, &config)?;

        match self
            .persist_generation(&exam, generation_id, &config, &variants)
            .await
        {
            Ok(generation) => {
                tracing::info!(
                    "Generated {} variants for exam {} (generation {})",
                    variants.len(),
                    exam.id,
                    generation.id
                );
                Ok((generation, variants))
            }
            Err(err) => {
                tracing::error!(
                    "Variant generation for exam {} failed: {:?}",
                    exam_id,
                    err
                );
                self.record_failed_generation(generation_id, exam_id, &config)
                    .await;
                Err(err)
            }
        }
    }

    async fn persist_generation(
        &self,
        exam: &Exam,
        generation_id: Uuid,
        config: &GenerationConfig,
        variants: &[Variant],
    ) -> Result<Generation> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO generations
                   (id, exam_id, number_of_variants, randomize_question_order,
                    randomize_option_order, randomize_true_false, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(generation_id)
        .bind(exam.id)
        .bind(config.number_of_variants)
        .bind(config.randomize_question_order)
        .bind(config.randomize_option_order)
        .bind(config.randomize_true_false)
        .bind(status::PENDING)
        .execute(&mut *tx)
        .await?;

        for variant in variants {
            sqlx::query(
                r#"INSERT INTO variants
                       (id, generation_id, variant_number, variant_code,
                        question_order, option_orders)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(variant.id)
            .bind(variant.generation_id)
            .bind(variant.variant_number)
            .bind(&variant.variant_code)
            .bind(&variant.question_order)
            .bind(sqlx::types::Json(&variant.option_orders.0))
            .execute(&mut *tx)
            .await?;
        }

        let generation = sqlx::query_as::<_, Generation>(
            r#"UPDATE generations SET status = $1 WHERE id = $2
               RETURNING id, exam_id, number_of_variants, randomize_question_order,
                         randomize_option_order, randomize_true_false, status, created_at"#,
        )
        .bind(status::COMPLETED)
        .bind(generation_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(generation)
    }

    async fn record_failed_generation(
        &self,
        generation_id: Uuid,
        exam_id: Uuid,
        config: &GenerationConfig,
    ) {
        let outcome = sqlx::query(
            r#"INSERT INTO generations
                   (id, exam_id, number_of_variants, randomize_question_order,
                    randomize_option_order, randomize_true_false, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(generation_id)
        .bind(exam_id)
        .bind(config.number_of_variants)
        .bind(config.randomize_question_order)
        .bind(config.randomize_option_order)
        .bind(config.randomize_true_false)
        .bind(status::FAILED)
        .execute(&self.pool)
        .await;

        if let Err(err) = outcome {
            tracing::warn!(
                "Could not record failed generation {}: {:?}",
                generation_id,
                err
            );
        }
    }

    pub async fn get_generation(&self, generation_id: Uuid) -> Result<(Generation, Vec<Variant>)> {
        let generation = sqlx::query_as::<_, Generation>(
            r#"SELECT id, exam_id, number_of_variants, randomize_question_order,
                      randomize_option_order, randomize_true_false, status, created_at
               FROM generations WHERE id = $1"#,
        )
        .bind(generation_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Generation {} not found", generation_id)))?;

        let variants = sqlx::query_as::<_, Variant>(
            r#"SELECT id, generation_id, variant_number, variant_code,
                      question_order, option_orders, created_at
               FROM variants WHERE generation_id = $1 ORDER BY variant_number"#,
        )
        .bind(generation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok((generation, variants))
    }

    pub async fn list_generations(&self, exam_id: Uuid) -> Result<Vec<Generation>> {
        let generations = sqlx::query_as::<_, Generation>(
            r#"SELECT id, exam_id, number_of_variants, randomize_question_order,
                      randomize_option_order, randomize_true_false, status, created_at
               FROM generations WHERE exam_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(generations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(position: i32, question_type: &str, options: &[&str], correct: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            exam_id: Uuid::nil(),
            position,
            question_type: question_type.to_string(),
            prompt: format!("Question {}", position + 1),
            options: sqlx::types::Json(options.iter().map(|o| o.to_string()).collect()),
            correct_answer: correct.to_string(),
            points: 5,
            difficulty: None,
            topic: None,
        }
    }

    fn mixed_questions() -> Vec<Question> {
        vec![
            question(0, "multiple_choice", &["Paris", "Rome", "Oslo", "Bern"], "Paris"),
            question(1, "true_false", &["True", "False"], "True"),
            question(2, "multiple_choice", &["2", "4", "8"], "4"),
        ]
    }

    fn config(n: i32, q: bool, o: bool, tf: bool) -> GenerationConfig {
        GenerationConfig {
            number_of_variants: n,
            randomize_question_order: q,
            randomize_option_order: o,
            randomize_true_false: tf,
        }
    }

    fn is_permutation(order: &[i32], len: usize) -> bool {
        let mut seen = vec![false; len];
        if order.len() != len {
            return false;
        }
        for &idx in order {
            if idx < 0 || idx as usize >= len || seen[idx as usize] {
                return false;
            }
            seen[idx as usize] = true;
        }
        true
    }

    #[test]
    fn empty_exam_is_rejected() {
        let err = build_variants(Uuid::new_v4(), &[], &config(3, true, true, true)).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn unshuffled_variants_keep_canonical_order() {
        let questions = mixed_questions();
        let variants =
            build_variants(Uuid::new_v4(), &questions, &config(4, false, false, false)).unwrap();
        assert_eq!(variants.len(), 4);
        for variant in &variants {
            assert_eq!(variant.question_order, vec![0, 1, 2]);
            for (c, question) in questions.iter().enumerate() {
                let identity: Vec<i32> = (0..question.options.len() as i32).collect();
                assert_eq!(variant.option_orders[c], identity);
            }
        }
    }

    #[test]
    fn every_order_is_a_bijection() {
        let questions = mixed_questions();
        let variants =
            build_variants(Uuid::new_v4(), &questions, &config(20, true, true, true)).unwrap();
        for variant in &variants {
            assert!(is_permutation(&variant.question_order, questions.len()));
            for (c, question) in questions.iter().enumerate() {
                assert!(is_permutation(
                    &variant.option_orders[c],
                    question.options.len()
                ));
            }
        }
    }

    #[test]
    fn true_false_flag_only_touches_true_false_questions() {
        let questions = mixed_questions();
        let variants =
            build_variants(Uuid::new_v4(), &questions, &config(10, false, false, true)).unwrap();
        for variant in &variants {
            // MC questions (canonical indices 0 and 2) stay identity.
            assert_eq!(variant.option_orders[0], vec![0, 1, 2, 3]);
            assert_eq!(variant.option_orders[2], vec![0, 1, 2]);
            assert!(is_permutation(&variant.option_orders[1], 2));
        }
    }

    #[test]
    fn codes_follow_variant_numbers() {
        let questions = mixed_questions();
        let variants =
            build_variants(Uuid::new_v4(), &questions, &config(28, false, false, false)).unwrap();
        assert_eq!(variants[0].variant_code, "A");
        assert_eq!(variants[25].variant_code, "Z");
        assert_eq!(variants[26].variant_code, "AA");
        assert_eq!(variants[27].variant_code, "AB");
        for (i, variant) in variants.iter().enumerate() {
            assert_eq!(variant.variant_number, i as i32 + 1);
        }
    }
}

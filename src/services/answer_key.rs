//! Pure translation between a variant's local positions and the exam's
//! canonical questions/answers. Everything here is reproducible at any time
//! from the variant's stored permutations alone.

use crate::error::{Error, Result};
use crate::models::exam::{Question, QuestionType};
use crate::models::generation::Variant;
use crate::utils::codes::{label_index, option_label};

/// The canonical question shown at `local_position` (0-based) on a variant.
pub fn canonical_question_of<'a>(
    variant: &Variant,
    questions: &'a [Question],
    local_position: usize,
) -> Result<&'a Question> {
    let canonical_index = canonical_index_at(variant, local_position)?;
    questions.get(canonical_index).ok_or_else(|| {
        Error::Internal(format!(
            "variant {} references canonical question index {} outside the exam",
            variant.variant_code, canonical_index
        ))
    })
}

/// Local position at which a variant shows the question with the given
/// canonical index. Inverse of `canonical_question_of`.
pub fn local_position_of(variant: &Variant, canonical_index: usize) -> Result<usize> {
    variant
        .question_order
        .iter()
        .position(|c| *c as usize == canonical_index)
        .ok_or_else(|| {
            Error::Internal(format!(
                "variant {} has no local position for canonical question index {}",
                variant.variant_code, canonical_index
            ))
        })
}

/// The correct answer at `local_position`, expressed in that variant's local
/// labeling: the local option letter for multiple choice, the canonical
/// `True`/`False` literal for true/false (option shuffling only reorders the
/// printed statements, it does not relabel the literals students write).
pub fn correct_local_answer(
    variant: &Variant,
    questions: &[Question],
    local_position: usize,
) -> Result<String> {
    let canonical_index = canonical_index_at(variant, local_position)?;
    let question = questions.get(canonical_index).ok_or_else(|| {
        Error::Internal(format!(
            "variant {} references canonical question index {} outside the exam",
            variant.variant_code, canonical_index
        ))
    })?;

    match question.kind() {
        Some(QuestionType::TrueFalse) => Ok(question.correct_answer.clone()),
        Some(QuestionType::MultipleChoice) => {
            let correct_canonical = question.correct_option_index().ok_or_else(|| {
                Error::Internal(format!(
                    "question {} has no option matching its correct answer",
                    question.id
                ))
            })?;
            let order = option_order_for(variant, canonical_index)?;
            let local = order
                .iter()
                .position(|c| *c as usize == correct_canonical)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "variant {} option order for question {} is not a bijection",
                        variant.variant_code, question.id
                    ))
                })?;
            Ok(option_label(local))
        }
        None => Err(Error::Internal(format!(
            "unknown question type '{}' on question {}",
            question.question_type, question.id
        ))),
    }
}

/// Canonical option text a raw answer cell resolves to, so choices can be
/// pooled across differently shuffled variants. `None` when the cell does
/// not name any option of the question.
pub fn selected_canonical_option(
    variant: &Variant,
    questions: &[Question],
    local_position: usize,
    raw_answer: &str,
) -> Result<Option<String>> {
    let canonical_index = canonical_index_at(variant, local_position)?;
    let question = questions.get(canonical_index).ok_or_else(|| {
        Error::Internal(format!(
            "variant {} references canonical question index {} outside the exam",
            variant.variant_code, canonical_index
        ))
    })?;

    let trimmed = raw_answer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match question.kind() {
        Some(QuestionType::TrueFalse) => Ok(question
            .options
            .iter()
            .find(|o| o.trim().eq_ignore_ascii_case(trimmed))
            .cloned()),
        Some(QuestionType::MultipleChoice) => {
            let local = match label_index(trimmed) {
                Some(local) => local,
                None => return Ok(None),
            };
            let order = option_order_for(variant, canonical_index)?;
            let canonical_option = match order.get(local) {
                Some(idx) => *idx as usize,
                None => return Ok(None),
            };
            Ok(question.options.get(canonical_option).cloned())
        }
        None => Ok(None),
    }
}

fn canonical_index_at(variant: &Variant, local_position: usize) -> Result<usize> {
    variant
        .question_order
        .get(local_position)
        .map(|c| *c as usize)
        .ok_or_else(|| {
            Error::Internal(format!(
                "local position {} out of range for variant {}",
                local_position, variant.variant_code
            ))
        })
}

fn option_order_for(variant: &Variant, canonical_index: usize) -> Result<&[i32]> {
    variant
        .option_orders
        .get(canonical_index)
        .map(|o| o.as_slice())
        .ok_or_else(|| {
            Error::Internal(format!(
                "variant {} is missing an option order for canonical question index {}",
                variant.variant_code, canonical_index
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

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

    fn variant(question_order: Vec<i32>, option_orders: Vec<Vec<i32>>) -> Variant {
        Variant {
            id: Uuid::new_v4(),
            generation_id: Uuid::new_v4(),
            variant_number: 1,
            variant_code: "A".to_string(),
            question_order,
            option_orders: sqlx::types::Json(option_orders),
            created_at: None,
        }
    }

    fn fixture() -> (Vec<Question>, Variant) {
        let questions = vec![
            question(0, "multiple_choice", &["Paris", "Rome", "Oslo"], "Paris"),
            question(1, "true_false", &["True", "False"], "False"),
            question(2, "multiple_choice", &["2", "4", "8", "16"], "8"),
        ];
        // Local order: Q3, Q1, Q2. Q1's options reversed, Q3's rotated left.
        let variant = variant(
            vec![2, 0, 1],
            vec![vec![2, 1, 0], vec![1, 0], vec![1, 2, 3, 0]],
        );
        (questions, variant)
    }

    #[test]
    fn canonical_lookup_inverts_question_order() {
        let (questions, variant) = fixture();
        assert_eq!(
            canonical_question_of(&variant, &questions, 0).unwrap().id,
            questions[2].id
        );
        assert_eq!(
            canonical_question_of(&variant, &questions, 2).unwrap().id,
            questions[1].id
        );
    }

    #[test]
    fn round_trip_recovers_local_position() {
        let (questions, variant) = fixture();
        for local in 0..questions.len() {
            let q = canonical_question_of(&variant, &questions, local).unwrap();
            let canonical_index = q.position as usize;
            assert_eq!(local_position_of(&variant, canonical_index).unwrap(), local);
        }
    }

    #[test]
    fn correct_local_answer_composes_both_permutations() {
        let (questions, variant) = fixture();
        // Local 0 is canonical Q3 (correct "8", canonical option 2); its
        // order [1, 2, 3, 0] puts option 2 at local position 1 → "B".
        assert_eq!(correct_local_answer(&variant, &questions, 0).unwrap(), "B");
        // Local 1 is canonical Q1 (correct "Paris", canonical option 0);
        // order [2, 1, 0] puts it at local position 2 → "C".
        assert_eq!(correct_local_answer(&variant, &questions, 1).unwrap(), "C");
        // True/false keeps the literal regardless of printed order.
        assert_eq!(
            correct_local_answer(&variant, &questions, 2).unwrap(),
            "False"
        );
    }

    #[test]
    fn identity_variant_answers_match_canonical() {
        let questions = vec![
            question(0, "multiple_choice", &["Paris", "Rome", "Oslo"], "Rome"),
            question(1, "true_false", &["True", "False"], "True"),
        ];
        let variant = variant(vec![0, 1], vec![vec![0, 1, 2], vec![0, 1]]);
        assert_eq!(correct_local_answer(&variant, &questions, 0).unwrap(), "B");
        assert_eq!(correct_local_answer(&variant, &questions, 1).unwrap(), "True");
    }

    #[test]
    fn selected_option_resolves_through_the_shuffle() {
        let (questions, variant) = fixture();
        // Local 0 is canonical Q3 with order [1, 2, 3, 0]: letter "A" is
        // canonical option 1 ("4"), letter "D" is canonical option 0 ("2").
        assert_eq!(
            selected_canonical_option(&variant, &questions, 0, "A").unwrap(),
            Some("4".to_string())
        );
        assert_eq!(
            selected_canonical_option(&variant, &questions, 0, "d").unwrap(),
            Some("2".to_string())
        );
        assert_eq!(
            selected_canonical_option(&variant, &questions, 0, "Z").unwrap(),
            None
        );
        assert_eq!(
            selected_canonical_option(&variant, &questions, 2, "false").unwrap(),
            Some("False".to_string())
        );
        assert_eq!(selected_canonical_option(&variant, &questions, 2, "").unwrap(), None);
    }
}

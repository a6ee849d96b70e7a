//! End-to-end run of the in-memory pipeline: generate variants, build an
//! answer table against their keys, ingest it, and analyze the scores.
//! Everything up to persistence is pure, so no database is needed.

use uuid::Uuid;

use examgen_backend::models::exam::Question;
use examgen_backend::models::generation::GenerationConfig;
use examgen_backend::services::answer_key;
use examgen_backend::services::export_service::{ExportSections, ExportService};
use examgen_backend::services::ingest_service::{
    ResultIngestor, RosterStudent, UploadContext,
};
use examgen_backend::services::psychometrics::{analyze, AnalysisOptions, StudentSample};
use examgen_backend::services::score_service::validate_batch;
use examgen_backend::services::variant_service::build_variants;

fn question(
    exam_id: Uuid,
    position: i32,
    question_type: &str,
    options: &[&str],
    correct: &str,
    points: i32,
) -> Question {
    Question {
        id: Uuid::new_v4(),
        exam_id,
        position,
        question_type: question_type.to_string(),
        prompt: format!("Question {}", position + 1),
        options: sqlx::types::Json(options.iter().map(|o| o.to_string()).collect()),
        correct_answer: correct.to_string(),
        points,
        difficulty: None,
        topic: None,
    }
}

fn exam_questions(exam_id: Uuid) -> Vec<Question> {
    vec![
        question(exam_id, 0, "multiple_choice", &["3", "4", "5", "6"], "4", 10),
        question(exam_id, 1, "true_false", &["True", "False"], "True", 5),
        question(
            exam_id,
            2,
            "multiple_choice",
            &["Mercury", "Venus", "Mars"],
            "Mercury",
            10,
        ),
    ]
}

/// Build one upload row answering every question of the student's variant
/// correctly, in the variant's local column order.
fn perfect_row(
    student_id: &str,
    variant_number: i32,
    variant: &examgen_backend::models::generation::Variant,
    questions: &[Question],
) -> String {
    let mut cells = vec![student_id.to_string(), variant_number.to_string()];
    for local in 0..questions.len() {
        cells.push(answer_key::correct_local_answer(variant, questions, local).unwrap());
    }
    cells.join(",")
}

#[test]
fn shuffled_generation_round_trips_through_ingestion() {
    let exam_id = Uuid::new_v4();
    let questions = exam_questions(exam_id);
    let config = GenerationConfig {
        number_of_variants: 3,
        randomize_question_order: true,
        randomize_option_order: true,
        randomize_true_false: true,
    };
    let variants = build_variants(Uuid::new_v4(), &questions, &config).unwrap();
    assert_eq!(variants.len(), 3);

    // One perfect answer sheet per variant, keyed by each variant's own
    // shuffled answer key.
    let mut table = String::from("student_id,variant,c1,c2,c3\n");
    for (i, variant) in variants.iter().enumerate() {
        table.push_str(&perfect_row(
            &format!("s{}", i + 1),
            variant.variant_number,
            variant,
            &questions,
        ));
        table.push('\n');
    }

    let roster = vec![RosterStudent {
        student_id: "s1".to_string(),
        full_name: "First Student".to_string(),
    }];
    let ctx = UploadContext {
        questions: &questions,
        variants: &variants,
        number_of_variants: config.number_of_variants,
        total_points: 25,
        roster: &roster,
    };
    let scores = ResultIngestor::ingest(&table, &ctx).unwrap();

    assert_eq!(scores.len(), 3);
    for score in &scores {
        assert_eq!(score.total_score, 25);
        assert_eq!(score.percentage, 100.0);
        assert!(score.details.iter().all(|d| d.is_correct));
        // Every answer resolves back to the canonical question set.
        for detail in &score.details {
            assert!(questions.iter().any(|q| q.id == detail.question_id));
        }
    }
    assert_eq!(scores[0].student_name.as_deref(), Some("First Student"));

    // The batch passes persistence preconditions as-is.
    validate_batch(&scores, 25).unwrap();
}

#[test]
fn concrete_two_question_scenario() {
    // Exam with Q1 correct "A" and Q2 correct "True", one unshuffled variant.
    let exam_id = Uuid::new_v4();
    let questions = vec![
        question(exam_id, 0, "multiple_choice", &["Alpha", "Beta"], "Alpha", 10),
        question(exam_id, 1, "true_false", &["True", "False"], "True", 10),
    ];
    let config = GenerationConfig {
        number_of_variants: 1,
        randomize_question_order: false,
        randomize_option_order: false,
        randomize_true_false: false,
    };
    let variants = build_variants(Uuid::new_v4(), &questions, &config).unwrap();
    let ctx = UploadContext {
        questions: &questions,
        variants: &variants,
        number_of_variants: 1,
        total_points: 20,
        roster: &[],
    };

    let perfect = ResultIngestor::ingest("student_id,variant,q1,q2\n123,1,A,True\n", &ctx).unwrap();
    assert_eq!(perfect[0].total_score, 20);
    assert_eq!(perfect[0].percentage, 100.0);

    let wrong = ResultIngestor::ingest("student_id,variant,q1,q2\n123,1,B,False\n", &ctx).unwrap();
    assert_eq!(wrong[0].total_score, 0);
    assert_eq!(wrong[0].percentage, 0.0);
}

#[test]
fn ingested_scores_feed_the_analyzer() {
    let exam_id = Uuid::new_v4();
    let questions = exam_questions(exam_id);
    let config = GenerationConfig {
        number_of_variants: 2,
        randomize_question_order: true,
        randomize_option_order: true,
        randomize_true_false: false,
    };
    let variants = build_variants(Uuid::new_v4(), &questions, &config).unwrap();

    // Four students: two perfect sheets, one partially wrong, one blank.
    let mut table = String::from("student_id,variant,c1,c2,c3\n");
    table.push_str(&perfect_row("s1", 1, &variants[0], &questions));
    table.push('\n');
    table.push_str(&perfect_row("s2", 2, &variants[1], &questions));
    table.push('\n');
    let partially_wrong = {
        let variant = &variants[0];
        let mut cells = vec!["s3".to_string(), "1".to_string()];
        cells.push(answer_key::correct_local_answer(variant, &questions, 0).unwrap());
        cells.push("bogus".to_string());
        cells.push("bogus".to_string());
        cells.join(",")
    };
    table.push_str(&partially_wrong);
    table.push('\n');
    table.push_str("s4,2,,,\n");

    let ctx = UploadContext {
        questions: &questions,
        variants: &variants,
        number_of_variants: 2,
        total_points: 25,
        roster: &[],
    };
    let scores = ResultIngestor::ingest(&table, &ctx).unwrap();
    assert_eq!(scores.len(), 4);
    assert_eq!(scores[3].total_score, 0);

    let samples: Vec<StudentSample> = scores.iter().map(StudentSample::from_score).collect();
    let analysis = analyze(&questions, &samples, &AnalysisOptions::default()).unwrap();

    assert_eq!(analysis.summary.student_count, 4);
    assert_eq!(analysis.summary.question_count, 3);
    for q in &analysis.questions {
        let difficulty = q.difficulty_index.unwrap();
        assert!((0.0..=1.0).contains(&difficulty));
    }
    // The blank sheet shows up as omissions on multiple-choice items.
    let first_mc = &analysis.questions[0];
    assert!(first_mc.distractors.as_ref().unwrap().omitted_count >= 1);

    // Both export views render the same analysis.
    let items = ExportService::render_items_csv(&analysis, &ExportSections::default());
    assert!(items.contains("average_difficulty"));
    let students = ExportService::render_students_csv(&analysis);
    assert_eq!(students.trim_end().lines().count(), 5);
}

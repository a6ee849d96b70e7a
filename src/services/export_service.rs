//! Tabular-text rendering of an analysis. Two views: the aggregate +
//! question-level table, and the per-student mapping. Plain comma-separated
//! text; document/archive formatting is a caller concern.

use crate::services::psychometrics::AnalysisResult;

#[derive(Debug, Clone, Copy)]
pub struct ExportSections {
    pub significance: bool,
    pub distractors: bool,
}

impl Default for ExportSections {
    fn default() -> Self {
        Self {
            significance: true,
            distractors: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportView {
    Items,
    Students,
}

impl ExportView {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "items" | "questions" => Some(ExportView::Items),
            "students" => Some(ExportView::Students),
            _ => None,
        }
    }
}

pub struct ExportService;

impl ExportService {
    /// Aggregate summary block followed by the per-question table.
    pub fn render_items_csv(analysis: &AnalysisResult, sections: &ExportSections) -> String {
        let mut out = String::new();
        let summary = &analysis.summary;

        out.push_str("metric,value\n");
        push_metric(&mut out, "students", Some(summary.student_count as f64));
        push_metric(&mut out, "questions", Some(summary.question_count as f64));
        push_metric(&mut out, "average_difficulty", summary.average_difficulty);
        push_metric(
            &mut out,
            "average_discrimination",
            summary.average_discrimination,
        );
        push_metric(
            &mut out,
            "average_point_biserial",
            summary.average_point_biserial,
        );
        push_metric(
            &mut out,
            "cronbach_alpha",
            summary.reliability.cronbach_alpha,
        );
        push_metric(
            &mut out,
            "standard_error_of_measurement",
            summary.reliability.standard_error_of_measurement,
        );
        let dist = &summary.score_distribution;
        push_metric(&mut out, "score_mean", dist.mean);
        push_metric(&mut out, "score_median", dist.median);
        push_metric(&mut out, "score_std_dev", dist.std_dev);
        push_metric(&mut out, "score_skewness", dist.skewness);
        push_metric(&mut out, "score_kurtosis", dist.kurtosis);
        push_metric(&mut out, "score_min", dist.min);
        push_metric(&mut out, "score_max", dist.max);
        if let Some([q1, q2, q3]) = dist.quartiles {
            push_metric(&mut out, "score_q1", Some(q1));
            push_metric(&mut out, "score_q2", Some(q2));
            push_metric(&mut out, "score_q3", Some(q3));
        }
        out.push('\n');

        let mut header = vec![
            "position",
            "question_id",
            "prompt",
            "responses",
            "correct",
            "difficulty",
            "discrimination",
            "point_biserial",
        ];
        if sections.significance {
            header.extend([
                "t_statistic",
                "p_value",
                "degrees_of_freedom",
                "critical_value",
                "significant",
            ]);
        }
        if sections.distractors {
            header.extend(["distractors", "omitted_count", "omitted_percentage"]);
        }
        out.push_str(&header.join(","));
        out.push('\n');

        for q in &analysis.questions {
            let mut row = vec![
                (q.position + 1).to_string(),
                q.question_id.to_string(),
                csv_field(&q.prompt),
                q.total_responses.to_string(),
                q.correct_responses.to_string(),
                fmt_opt(q.difficulty_index),
                fmt_opt(q.discrimination_index),
                fmt_opt(q.point_biserial),
            ];
            if sections.significance {
                match &q.significance {
                    Some(sig) => row.extend([
                        fmt(sig.t_statistic),
                        fmt(sig.p_value),
                        fmt(sig.degrees_of_freedom),
                        fmt(sig.critical_value),
                        sig.is_significant.to_string(),
                    ]),
                    None => row.extend(std::iter::repeat(String::new()).take(5)),
                }
            }
            if sections.distractors {
                match &q.distractors {
                    Some(d) => {
                        let choices = d
                            .choices
                            .iter()
                            .map(|c| format!("{} x{}", c.option, c.count))
                            .collect::<Vec<_>>()
                            .join("; ");
                        row.extend([
                            csv_field(&choices),
                            d.omitted_count.to_string(),
                            fmt(d.omitted_percentage),
                        ]);
                    }
                    None => row.extend(std::iter::repeat(String::new()).take(3)),
                }
            }
            out.push_str(&row.join(","));
            out.push('\n');
        }

        out
    }

    /// Per-student mapping view.
    pub fn render_students_csv(analysis: &AnalysisResult) -> String {
        let mut out = String::new();
        out.push_str("student_id,total_score,correct_count,percentile_rank\n");
        for s in &analysis.students {
            out.push_str(&format!(
                "{},{},{},{}\n",
                csv_field(&s.student_id),
                fmt(s.total_score),
                s.correct_count,
                fmt(s.percentile_rank)
            ));
        }
        out
    }
}

fn push_metric(out: &mut String, name: &str, value: Option<f64>) {
    out.push_str(&format!("{},{}\n", name, fmt_opt(value)));
}

/// Undefined metrics render as an empty cell.
fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt).unwrap_or_default()
}

fn fmt(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1.0e15 {
        format!("{}", value)
    } else {
        format!("{:.4}", value)
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::Question;
    use crate::services::psychometrics::{analyze, AnalysisOptions, ItemAnswer, StudentSample};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn fixture() -> AnalysisResult {
        let question = Question {
            id: Uuid::new_v4(),
            exam_id: Uuid::nil(),
            position: 0,
            question_type: "multiple_choice".to_string(),
            prompt: "Capital of France, per the atlas?".to_string(),
            options: sqlx::types::Json(vec![
                "Paris".to_string(),
                "Rome".to_string(),
                "Oslo".to_string(),
            ]),
            correct_answer: "Paris".to_string(),
            points: 10,
            difficulty: None,
            topic: None,
        };
        let mk = |id: &str, correct: bool| {
            let mut answers = HashMap::new();
            answers.insert(
                question.id,
                ItemAnswer {
                    answer: if correct { "A" } else { "B" }.to_string(),
                    selected_option: Some(if correct { "Paris" } else { "Rome" }.to_string()),
                    is_correct: correct,
                    points: if correct { 10.0 } else { 0.0 },
                },
            );
            StudentSample {
                student_id: id.to_string(),
                total_score: if correct { 10.0 } else { 0.0 },
                answers,
            }
        };
        let students = vec![mk("123", true), mk("456", false)];
        analyze(
            &[question],
            &students,
            &AnalysisOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn items_view_includes_summary_and_question_rows() {
        let analysis = fixture();
        let csv = ExportService::render_items_csv(&analysis, &ExportSections::default());
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("average_difficulty,0.5"));
        // Prompt contains a comma, so it must be quoted.
        assert!(csv.contains("\"Capital of France, per the atlas?\""));
        assert!(csv.contains("distractors"));
    }

    #[test]
    fn sections_can_be_switched_off() {
        let analysis = fixture();
        let csv = ExportService::render_items_csv(
            &analysis,
            &ExportSections {
                significance: false,
                distractors: false,
            },
        );
        assert!(!csv.contains("p_value"));
        assert!(!csv.contains("omitted_count"));
    }

    #[test]
    fn students_view_lists_every_student() {
        let analysis = fixture();
        let csv = ExportService::render_students_csv(&analysis);
        let lines: Vec<&str> = csv.trim_end().lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "student_id,total_score,correct_count,percentile_rank");
        assert!(lines[1].starts_with("123,10,1,"));
        assert!(lines[2].starts_with("456,0,0,"));
    }

    #[test]
    fn view_parsing_accepts_known_names_only() {
        assert_eq!(ExportView::parse("items"), Some(ExportView::Items));
        assert_eq!(ExportView::parse(" Students "), Some(ExportView::Students));
        assert_eq!(ExportView::parse("pdf"), None);
    }
}

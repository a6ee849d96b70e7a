//! Parsing and strict validation of uploaded answer tables.
//!
//! The pipeline is a fail-fast chain: header check → shape check →
//! variant-domain check → row mapping → aggregation. Every stage returns a
//! parsed value or a specific error, runs entirely in memory, and any
//! failure aborts the whole batch before persistence is even attempted.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::exam::Question;
use crate::models::generation::Variant;
use crate::services::answer_key;

const STUDENT_COLUMNS: [&str; 5] = [
    "student_id",
    "student id",
    "student_number",
    "student number",
    "student",
];
const VARIANT_COLUMNS: [&str; 3] = ["variant", "variant_number", "variant number"];

/// Enrolled-roster entry, used to resolve display names onto scored
/// records. Enrichment only — unknown student ids still score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterStudent {
    pub student_id: String,
    pub full_name: String,
}

/// Everything the pipeline needs besides the raw table.
pub struct UploadContext<'a> {
    pub questions: &'a [Question],
    pub variants: &'a [Variant],
    pub number_of_variants: i32,
    pub total_points: i32,
    pub roster: &'a [RosterStudent],
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerDetail {
    pub question_id: Uuid,
    pub answer: String,
    pub selected_option: Option<String>,
    pub is_correct: bool,
    pub points: i32,
}

/// One scored record per student — the contract boundary handed to score
/// persistence and the analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct StudentScore {
    pub student_id: String,
    pub student_name: Option<String>,
    pub total_score: i32,
    pub percentage: f64,
    pub variant_code: String,
    pub details: Vec<AnswerDetail>,
}

struct ParsedTable {
    header: Vec<String>,
    /// (1-based source line number, cells)
    rows: Vec<(usize, Vec<String>)>,
}

struct HeaderLayout {
    student_col: usize,
    variant_col: usize,
    /// Answer columns in their stable header order.
    answer_cols: Vec<usize>,
}

struct MappedRow {
    student_id: String,
    variant_code: String,
    details: Vec<AnswerDetail>,
}

pub struct ResultIngestor;

impl ResultIngestor {
    /// Run the full pipeline over a comma-separated answer table.
    ///
    /// Returns one scored record per student, or the first stage error —
    /// there is no partial output.
    pub fn ingest(raw: &str, ctx: &UploadContext) -> Result<Vec<StudentScore>> {
        let table = parse_table(raw);
        let layout = check_header(&table.header)?;
        check_shape(&layout, ctx)?;
        let variants_by_number = check_variant_domain(&table, &layout, ctx)?;
        let rows = map_rows(&table, &layout, ctx, &variants_by_number)?;
        aggregate(rows, ctx)
    }
}

fn parse_table(raw: &str) -> ParsedTable {
    let mut lines = raw
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty());

    let header = lines
        .next()
        .map(|(_, line)| split_cells(line))
        .unwrap_or_default();
    let rows = lines
        .map(|(line_no, line)| (line_no, split_cells(line)))
        .collect();

    ParsedTable { header, rows }
}

fn split_cells(line: &str) -> Vec<String> {
    line.split(',').map(|cell| cell.trim().to_string()).collect()
}

/// Stage 1: the student-identifier and variant columns must both be present
/// (name match, case-insensitive).
fn check_header(header: &[String]) -> Result<HeaderLayout> {
    let variant_col = find_column(header, &VARIANT_COLUMNS)
        .ok_or_else(|| Error::Validation("no variant column found".to_string()))?;
    let student_col = find_column(header, &STUDENT_COLUMNS)
        .ok_or_else(|| Error::Validation("no student identifier column found".to_string()))?;

    let answer_cols = (0..header.len())
        .filter(|&i| i != student_col && i != variant_col)
        .collect();

    Ok(HeaderLayout {
        student_col,
        variant_col,
        answer_cols,
    })
}

fn find_column(header: &[String], names: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|cell| names.iter().any(|n| cell.trim().eq_ignore_ascii_case(n)))
}

/// Stage 2: the answer-column count must exactly equal the canonical
/// question count.
fn check_shape(layout: &HeaderLayout, ctx: &UploadContext) -> Result<()> {
    if ctx.questions.is_empty() {
        return Err(Error::Validation("no exam questions found".to_string()));
    }
    if layout.answer_cols.len() != ctx.questions.len() {
        return Err(Error::Validation(format!(
            "question count mismatch: expected {} answer columns, found {}",
            ctx.questions.len(),
            layout.answer_cols.len()
        )));
    }
    Ok(())
}

/// Stage 3: the variant numbers referenced by the rows must be exactly the
/// generation's defined set — no undefined numbers, no unused variants.
fn check_variant_domain<'a>(
    table: &ParsedTable,
    layout: &HeaderLayout,
    ctx: &'a UploadContext,
) -> Result<HashMap<i32, &'a Variant>> {
    if ctx.variants.is_empty() {
        return Err(Error::Validation("no exam variants found".to_string()));
    }

    let mut referenced = BTreeSet::new();
    let mut invalid = Vec::new();
    for (line_no, cells) in &table.rows {
        let raw = cells
            .get(layout.variant_col)
            .map(|c| c.trim())
            .unwrap_or_default();
        match raw.parse::<i32>() {
            Ok(number) if number >= 1 && number <= ctx.number_of_variants => {
                referenced.insert(number);
            }
            _ => invalid.push(format!("'{}' (row {})", raw, line_no)),
        }
    }

    if !invalid.is_empty() {
        return Err(Error::Validation(format!(
            "invalid variant numbers found: {}",
            invalid.join(", ")
        )));
    }
    if referenced.len() != ctx.variants.len() {
        return Err(Error::Validation(format!(
            "variant count mismatch: expected {} distinct variants, found {}",
            ctx.variants.len(),
            referenced.len()
        )));
    }

    Ok(ctx
        .variants
        .iter()
        .map(|v| (v.variant_number, v))
        .collect())
}

/// Stage 4: resolve each row's answers to canonical questions through the
/// answer key and grade them.
fn map_rows(
    table: &ParsedTable,
    layout: &HeaderLayout,
    ctx: &UploadContext,
    variants_by_number: &HashMap<i32, &Variant>,
) -> Result<Vec<MappedRow>> {
    let mut mapped = Vec::with_capacity(table.rows.len());

    for (line_no, cells) in &table.rows {
        if cells.len() != table.header.len() {
            return Err(Error::Validation(format!(
                "row {} has {} columns, expected {}",
                line_no,
                cells.len(),
                table.header.len()
            )));
        }

        let student_id = cells[layout.student_col].trim().to_string();
        if student_id.is_empty() {
            return Err(Error::Validation(format!(
                "row {} is missing a student identifier",
                line_no
            )));
        }

        // The domain check already proved every row's number parses and is
        // defined on the generation.
        let number: i32 = cells[layout.variant_col].trim().parse().map_err(|_| {
            Error::Internal(format!("row {} variant number failed to re-parse", line_no))
        })?;
        let variant = variants_by_number.get(&number).ok_or_else(|| {
            Error::Internal(format!("variant number {} vanished after domain check", number))
        })?;

        let mut details = Vec::with_capacity(layout.answer_cols.len());
        for (local_position, &col) in layout.answer_cols.iter().enumerate() {
            let question = answer_key::canonical_question_of(variant, ctx.questions, local_position)?;
            let correct = answer_key::correct_local_answer(variant, ctx.questions, local_position)?;
            let raw_answer = cells[col].trim();
            let is_correct = normalize(raw_answer) == normalize(&correct);
            let selected_option = answer_key::selected_canonical_option(
                variant,
                ctx.questions,
                local_position,
                raw_answer,
            )?;

            details.push(AnswerDetail {
                question_id: question.id,
                answer: raw_answer.to_string(),
                selected_option,
                is_correct,
                points: if is_correct { question.points } else { 0 },
            });
        }

        mapped.push(MappedRow {
            student_id,
            variant_code: variant.variant_code.clone(),
            details,
        });
    }

    Ok(mapped)
}

/// Stage 5: one record per student, score summed over correct answers.
fn aggregate(rows: Vec<MappedRow>, ctx: &UploadContext) -> Result<Vec<StudentScore>> {
    let names: HashMap<&str, &str> = ctx
        .roster
        .iter()
        .map(|s| (s.student_id.as_str(), s.full_name.as_str()))
        .collect();

    let mut seen = BTreeSet::new();
    let mut scores = Vec::with_capacity(rows.len());
    for row in rows {
        if !seen.insert(row.student_id.clone()) {
            return Err(Error::Validation(format!(
                "duplicate student id in upload: {}",
                row.student_id
            )));
        }

        let total_score: i32 = row.details.iter().map(|d| d.points).sum();
        let percentage = if ctx.total_points > 0 {
            total_score as f64 / ctx.total_points as f64 * 100.0
        } else {
            0.0
        };

        scores.push(StudentScore {
            student_name: names.get(row.student_id.as_str()).map(|n| n.to_string()),
            student_id: row.student_id,
            total_score,
            percentage,
            variant_code: row.variant_code,
            details: row.details,
        });
    }

    Ok(scores)
}

fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

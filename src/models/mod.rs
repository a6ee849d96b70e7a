pub mod exam;
pub mod exam_result;
pub mod generation;

use serde::Deserialize;
use validator::Validate;

use crate::models::generation::GenerationConfig;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateVariantsPayload {
    #[validate(range(min = 1, message = "Number of variants must be at least 1"))]
    pub number_of_variants: i32,
    #[serde(default)]
    pub randomize_question_order: bool,
    #[serde(default)]
    pub randomize_option_order: bool,
    #[serde(default)]
    pub randomize_true_false: bool,
}

impl GenerateVariantsPayload {
    pub fn into_config(self) -> GenerationConfig {
        GenerationConfig {
            number_of_variants: self.number_of_variants,
            randomize_question_order: self.randomize_question_order,
            randomize_option_order: self.randomize_option_order,
            randomize_true_false: self.randomize_true_false,
        }
    }
}

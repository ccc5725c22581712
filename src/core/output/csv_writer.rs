//! Validation checklist CSV writer.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{CtxpackError, Result};
use crate::validation::ValidationSuite;

/// Columns of the checklist, in order.
pub const CSV_HEADER: [&str; 6] = ["Step", "Target", "Category", "Question", "Expected", "Passed"];

/// Writes a validation suite to CSV with semicolon delimiter.
///
/// # Format
/// - Delimiter: `;`
/// - Columns: `Step`, `Target`, `Category`, `Question`, `Expected`, `Passed`
/// - `Passed` is left empty for the tester to fill in
/// - Encoding: UTF-8
pub fn write_csv(suite: &ValidationSuite, output_path: impl AsRef<Path>) -> Result<()> {
    let csv = to_csv(suite)?;
    let mut file = File::create(output_path)?;
    file.write_all(csv.as_bytes())?;
    Ok(())
}

/// Converts a validation suite to a CSV string.
pub fn to_csv(suite: &ValidationSuite) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    let target = suite.target_platform.id();
    for (i, question) in suite.questions.iter().enumerate() {
        let step = (i + 1).to_string();
        let category = question.category.to_string();
        writer.write_record([
            step.as_str(),
            target,
            category.as_str(),
            question.question.as_str(),
            question.expected_answer_summary.as_str(),
            "",
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CtxpackError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

//! Prompt text for generation and repair conversations.

use crate::extract::TARGET_LANGUAGE;

/// System instruction describing the program the model must generate.
pub const GENERATION_INSTRUCTION: &str = r#"You are an expert Python developer specializing in log parsing and data processing.
Analyze the sample log entries you are given and write a complete Python program that batch-processes log files of the same format.

The program MUST:
1. Accept the command line arguments --input (directory containing the log files) and --output (directory for the Excel output).
2. Process every log file in the input directory exactly once.
3. Parse each log entry into structured fields according to the detected format.
4. Write all parsed data with openpyxl into ONE workbook (e.g. <output>/result.xlsx) with ONE sheet per input file.
   - Name each sheet after the input file name including its extension (e.g. "Apache_2k.log"), truncated to 31 characters.
   - Never use generic sheet names such as "Sheet1" or "Log Entries", and never merge files into one sheet.
   - Remove the default sheet (wb.remove(wb.active)) right after creating the workbook so no empty or duplicate sheet remains.
5. Output ONLY the parsed fields (e.g. datetime, level, module, pid, message). These columns are FORBIDDEN:
   - a source file column (the sheet name already identifies the file);
   - any row number, line number, index or sequence column;
   - any column holding the raw or original log line.
6. When date and time are spread across lines (e.g. a date header followed by time-only entries), merge them so each row has a single complete date/time column. Do not repeat the date in a separate column.
7. After finishing each file, print exactly one JSON line to stdout in this format:
   {"file": "<filename>", "progress": <0.0-1.0>, "total": <total_files>, "current": <files_done>}
8. Handle errors: wrap file operations in try/except and skip entries that cannot be parsed instead of crashing.

Return the complete program inside a single ```python code block."#;

/// Builds the user message that embeds the log sample.
pub fn sample_message(sample: &str) -> String {
    format!(
        "Please analyze the following sample log entries and generate a complete Python processing program.\n\n\
         Sample log entries:\n```\n{}\n```",
        sample
    )
}

/// System instruction for a repair conversation.
pub fn repair_instruction(failure_kind: &str) -> String {
    format!(
        "You are an expert Python developer. Fix the {} in the given Python code. \
         Return the complete fixed Python code inside a single ```{} code block. \
         Do not explain the changes, just return the corrected code.",
        failure_kind, TARGET_LANGUAGE
    )
}

/// Builds the user message carrying the failing code and its diagnostic.
pub fn repair_message(failure_kind: &str, code: &str, diagnostic: &str) -> String {
    format!(
        "The following Python code has a {kind}:\n\n```{lang}\n{code}\n```\n\n\
         Error message:\n```\n{diagnostic}\n```\n\n\
         Please fix the {kind} and return the complete corrected code.",
        kind = failure_kind,
        lang = TARGET_LANGUAGE,
        code = code,
        diagnostic = diagnostic,
    )
}

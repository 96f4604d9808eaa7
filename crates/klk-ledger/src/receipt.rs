//! Receipt numbering.

/// Format a receipt number, e.g. `RCP-2025-0042`.
///
/// `sequence` is the count of payments already recorded for `year` plus one.
/// Sequences beyond four digits render in full.
pub fn receipt_number(year: i32, sequence: u32) -> String {
    format!("RCP-{year}-{sequence:04}")
}

/// Parse the sequence back out of a receipt number for `year`.
pub fn receipt_sequence(year: i32, receipt: &str) -> Option<u32> {
    receipt
        .strip_prefix("RCP-")?
        .strip_prefix(&year.to_string())?
        .strip_prefix('-')?
        .parse()
        .ok()
}

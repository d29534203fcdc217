use chrono::Local;

/// The calendar date of the run as `YYYY-MM-DD`, used in backup names.
pub(crate) fn today_string() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

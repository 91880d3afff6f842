use roster_store::AttendanceExportRow;
use std::borrow::Cow;
use std::io::Write;

const HEADER: &str = "identity_id,display_name,period_key,committed_at";

/// Write attendance rows as CSV with a header line.
pub fn write_csv<W: Write>(out: &mut W, rows: &[AttendanceExportRow]) -> std::io::Result<()> {
    writeln!(out, "{HEADER}")?;
    for row in rows {
        writeln!(
            out,
            "{},{},{},{}",
            field(&row.identity_id),
            field(row.display_name.as_deref().unwrap_or("")),
            row.period_key,
            row.committed_at.to_rfc3339(),
        )?;
    }
    Ok(())
}

fn field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

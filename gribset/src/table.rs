//! Plain-text tables of record fields.

fn line(cells: &[String], width: &[usize]) -> String {
    cells
        .iter()
        .zip(width)
        .map(|(cell, &w)| format!("{cell:>w$}"))
        .collect::<Vec<_>>()
        .join("  ")
}

/// Right-aligned columns separated by two spaces, heading first, one line per
/// row. Column width is the widest of the key and every cell, across all rows.
///
/// With `max_rows = Some(n)` a listing longer than `n` shows the first and last
/// `n / 2` rows around a `...` line, and a trailing `"<len> records"` line is
/// appended whenever `max_rows` is set.
pub fn format_table(keys: &[String], rows: &[Vec<String>], max_rows: Option<usize>) -> String {
    let mut width: Vec<usize> = keys.iter().map(|k| k.len()).collect();
    for row in rows {
        for (w, cell) in width.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = line(keys, &width);
    out.push('\n');

    let len = rows.len();
    match max_rows {
        Some(n) if len > n => {
            let half = n / 2;
            for row in &rows[..half] {
                out.push_str(&line(row, &width));
                out.push('\n');
            }
            out.push_str("...\n");
            for row in &rows[len - half..] {
                out.push_str(&line(row, &width));
                out.push('\n');
            }
        }
        _ => {
            for row in rows {
                out.push_str(&line(row, &width));
                out.push('\n');
            }
        }
    }
    if max_rows.is_some() {
        out.push_str(&format!("{len} records\n"));
    }
    out
}

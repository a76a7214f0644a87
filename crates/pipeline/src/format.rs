//! Per-connection output format, set by the meta `format` command.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Table,
}

impl Format {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "table" => Some(Format::Table),
            _ => None,
        }
    }
}

/// Renders selected columns/rows as a fixed-width ASCII grid, used when a
/// connection has set `format_type":"table"`.
pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return "<empty>".to_string();
    }
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    let sep = |widths: &[usize]| {
        let mut s = String::from("+");
        for w in widths {
            s.push_str(&"-".repeat(w + 2));
            s.push('+');
        }
        s
    };
    let render_row = |cells: &[String], widths: &[usize]| {
        let mut s = String::from("|");
        for (cell, w) in cells.iter().zip(widths) {
            s.push(' ');
            s.push_str(cell);
            s.push_str(&" ".repeat(w - cell.len()));
            s.push_str(" |");
        }
        s
    };
    let mut out = String::new();
    out.push_str(&sep(&widths));
    out.push('\n');
    out.push_str(&render_row(columns, &widths));
    out.push('\n');
    out.push_str(&sep(&widths));
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(row, &widths));
        out.push('\n');
    }
    out.push_str(&sep(&widths));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_format_names_case_insensitively() {
        assert_eq!(Format::parse("JSON"), Some(Format::Json));
        assert_eq!(Format::parse("table"), Some(Format::Table));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn renders_aligned_columns() {
        let out = render_table(
            &["id".to_string(), "name".to_string()],
            &[vec!["1".to_string(), "alice".to_string()]],
        );
        assert!(out.contains("alice"));
        assert!(out.starts_with('+'));
    }
}

//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Paint an object name for terminal display.
pub fn objnam(name: &str, color: bool) -> String {
    if color {
        name.bright_cyan().bold().to_string()
    } else {
        name.to_owned()
    }
}

/// Paint an ON/OFF style status value.
pub fn status(value: &str, color: bool) -> String {
    if !color {
        return value.to_owned();
    }
    match value {
        "ON" => value.green().to_string(),
        "OFF" => value.dimmed().to_string(),
        "DSTROY" => value.red().to_string(),
        _ => value.yellow().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since single-item views are key/value
/// listings rather than rows.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => id_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Aligned `key: value` lines for detail views.
pub fn detail_lines<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let pairs: Vec<(&str, String)> = pairs.into_iter().collect();
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    pairs
        .iter()
        .map(|(k, v)| format!("{k:<width$}  {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Pretty or compact JSON. Serialization of our own types cannot fail in
/// practice; an error is rendered as a JSON string instead of panicking.
pub(crate) fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("\"serialization failed: {e}\""))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Item {
        objnam: &'static str,
        status: &'static str,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Object")]
        objnam: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                objnam: "C0001",
                status: "ON",
            },
            Item {
                objnam: "C0002",
                status: "OFF",
            },
        ]
    }

    fn row(item: &Item) -> Row {
        Row {
            objnam: item.objnam.into(),
            status: item.status.into(),
        }
    }

    #[test]
    fn table_output() {
        let out = render_list(&OutputFormat::Table, &items(), row, |i| i.objnam.into());
        insta::assert_snapshot!(out, @r"
        ╭────────┬────────╮
        │ Object │ Status │
        ├────────┼────────┤
        │ C0001  │ ON     │
        │ C0002  │ OFF    │
        ╰────────┴────────╯
        ");
    }

    #[test]
    fn plain_and_compact_json() {
        let plain = render_list(&OutputFormat::Plain, &items(), row, |i| i.objnam.into());
        assert_eq!(plain, "C0001\nC0002");

        let json = render_list(&OutputFormat::JsonCompact, &items(), row, |i| {
            i.objnam.into()
        });
        assert_eq!(
            json,
            r#"[{"objnam":"C0001","status":"ON"},{"objnam":"C0002","status":"OFF"}]"#
        );
    }

    #[test]
    fn uncolored_helpers_are_identity() {
        assert_eq!(objnam("B1101", false), "B1101");
        assert_eq!(status("ON", false), "ON");
    }

    #[test]
    fn detail_lines_align_keys() {
        let out = detail_lines([("Name", "Home".to_owned()), ("Version", "1.064".to_owned())]);
        assert_eq!(out, "Name     Home\nVersion  1.064");
    }
}

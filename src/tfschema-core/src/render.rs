//! Text and JSON rendering of schema blocks and name listings.

use crate::schema::{Attribute, Block};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Table,
    Json,
}

impl FromStr for Format {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            _ => Err(RenderError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Table => f.write_str("table"),
            Format::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown output format {0:?}, expected \"table\" or \"json\"")]
    UnknownFormat(String),
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render a block and, recursively, its nested block types.
pub fn render_block(block: &Block, format: Format) -> Result<String, RenderError> {
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(block)?),
        Format::Table => {
            let mut out = String::new();
            write_block_table(&mut out, block);
            Ok(out)
        }
    }
}

/// Render a list of resource type or data source names.
pub fn render_names(names: &[String], format: Format) -> Result<String, RenderError> {
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(names)?),
        Format::Table => {
            let mut out = String::new();
            for name in names {
                out.push_str(name);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

const HEADERS: [&str; 6] = [
    "ATTRIBUTE",
    "TYPE",
    "REQUIRED",
    "OPTIONAL",
    "COMPUTED",
    "SENSITIVE",
];

fn write_block_table(out: &mut String, block: &Block) {
    let rows: Vec<[String; 6]> = block
        .attributes
        .iter()
        .map(|(name, attr)| attribute_row(name, attr))
        .collect();
    write_table(out, &rows);

    for (name, nested) in &block.block_types {
        let _ = writeln!(
            out,
            "\nblock_type: {name}, nesting: {}, min_items: {}, max_items: {}",
            nested.nesting, nested.min_items, nested.max_items
        );
        write_block_table(out, &nested.block);
    }
}

fn attribute_row(name: &str, attr: &Attribute) -> [String; 6] {
    [
        name.to_string(),
        attr.effective_type().to_string(),
        attr.required.to_string(),
        attr.optional.to_string(),
        attr.computed.to_string(),
        attr.sensitive.to_string(),
    ]
}

fn write_table(out: &mut String, rows: &[[String; 6]]) {
    let mut widths = HEADERS.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let separator = widths.iter().fold(String::from("+"), |mut line, width| {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
        line
    });

    out.push_str(&separator);
    out.push('\n');
    write_row(out, &widths, HEADERS.iter().copied());
    out.push_str(&separator);
    out.push('\n');
    for row in rows {
        write_row(out, &widths, row.iter().map(String::as_str));
    }
    out.push_str(&separator);
    out.push('\n');
}

fn write_row<'a>(out: &mut String, widths: &[usize; 6], cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for (cell, &width) in cells.zip(widths.iter()) {
        let _ = write!(out, " {cell:<width$} |");
    }
    out.push('\n');
}

//! Lifts every `<table>` in a document into a [`CandidateGrid`].
//!
//! Multi-row headers are flattened into single names per column; duplicated
//! names get numeric suffixes; a first body row that merely echoes the
//! header is dropped.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

use crate::models::CandidateGrid;

pub fn extract_grids(html: &str) -> Vec<CandidateGrid> {
    let doc = Html::parse_document(html);
    let Ok(table_sel) = Selector::parse("table") else {
        return Vec::new();
    };
    doc.select(&table_sel)
        .filter_map(grid_from_table)
        .collect()
}

fn grid_from_table(table: ElementRef) -> Option<CandidateGrid> {
    let tr_sel = Selector::parse("tr").ok()?;
    let th_sel = Selector::parse("th").ok()?;
    let cell_sel = Selector::parse("th, td").ok()?;

    let all_rows: Vec<ElementRef> = table.select(&tr_sel).collect();
    if all_rows.is_empty() {
        return None;
    }

    // Header rows: the leading run of rows carrying <th> cells. Tables with
    // no <th> at all treat their first row as the header.
    let mut header_count = all_rows
        .iter()
        .take_while(|tr| tr.select(&th_sel).next().is_some())
        .count();
    if header_count == 0 {
        header_count = 1;
    }
    let (header_rows, body_rows) = all_rows.split_at(header_count);

    let headers = dedupe_headers(flatten_headers(header_rows, &cell_sel));
    if headers.is_empty() {
        return None;
    }

    let mut rows: Vec<Vec<String>> = body_rows
        .iter()
        .filter_map(|tr| {
            let cells = expand_row(tr, &cell_sel);
            if cells.is_empty() || cells.iter().all(|c| c.is_empty()) {
                None
            } else {
                Some(cells)
            }
        })
        .collect();

    let echoed = rows
        .first()
        .map(|row| echoes_header(&headers, row))
        .unwrap_or(false);
    if echoed {
        rows.remove(0);
    }

    Some(CandidateGrid { headers, rows })
}

/// Flatten the header rows into one name per column. Cells are placed on an
/// occupancy grid so `rowspan`/`colspan` land where a browser would put
/// them; a column's parts are then joined with spaces, collapsing to a
/// single token when every part is identical (merged cells repeat their
/// label).
fn flatten_headers(header_rows: &[ElementRef], cell_sel: &Selector) -> Vec<String> {
    let mut grid: Vec<Vec<Option<String>>> = Vec::new();

    for (r, tr) in header_rows.iter().enumerate() {
        while grid.len() <= r {
            grid.push(Vec::new());
        }
        let mut col = 0usize;
        for cell in tr.select(cell_sel) {
            while grid[r].get(col).map(Option::is_some).unwrap_or(false) {
                col += 1;
            }
            let text = cell_text(cell);
            let colspan = span_attr(cell, "colspan");
            let rowspan = span_attr(cell, "rowspan");
            for dr in 0..rowspan {
                let rr = r + dr;
                while grid.len() <= rr {
                    grid.push(Vec::new());
                }
                for dc in 0..colspan {
                    let cc = col + dc;
                    while grid[rr].len() <= cc {
                        grid[rr].push(None);
                    }
                    grid[rr][cc] = Some(text.clone());
                }
            }
            col += colspan;
        }
    }

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|c| {
            let parts: Vec<&str> = grid
                .iter()
                .filter_map(|row| row.get(c).and_then(Option::as_deref))
                .filter(|t| !t.is_empty())
                .collect();
            let joined = parts.join(" ");
            let tokens: Vec<&str> = joined.split_whitespace().collect();
            if tokens.len() >= 2 && tokens.iter().all(|t| *t == tokens[0]) {
                tokens[0].to_string()
            } else {
                joined
            }
        })
        .collect()
}

/// Duplicate flattened names get `.1`, `.2`, … suffixes.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            let out = if *count == 0 {
                name.clone()
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            out
        })
        .collect()
}

/// One body row, with `colspan` cells repeated across their span.
fn expand_row(tr: &ElementRef, cell_sel: &Selector) -> Vec<String> {
    let mut cells = Vec::new();
    for cell in tr.select(cell_sel) {
        let text = cell_text(cell);
        for _ in 0..span_attr(cell, "colspan") {
            cells.push(text.clone());
        }
    }
    cells
}

/// True when the row is a header duplicated into the body: at least
/// `max(2, columns/2)` cells reappear inside the header names once
/// whitespace is stripped.
fn echoes_header(headers: &[String], row: &[String]) -> bool {
    let stripped_headers: Vec<String> = headers
        .iter()
        .map(|h| h.split_whitespace().collect())
        .collect();
    let hits = row
        .iter()
        .map(|cell| cell.split_whitespace().collect::<String>())
        .filter(|cell| {
            !cell.is_empty() && stripped_headers.iter().any(|h| h.contains(cell.as_str()))
        })
        .count();
    hits >= std::cmp::max(2, headers.len() / 2)
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn span_attr(cell: ElementRef, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(1)
}

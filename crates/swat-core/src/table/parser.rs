use super::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    Csv,
    Whitespace,
    MultiSpace,
    FixedWidth,
}

impl ParseStrategy {
    pub const TEXT_ORDER: [Self; 3] = [Self::Whitespace, Self::MultiSpace, Self::FixedWidth];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Whitespace => "whitespace",
            Self::MultiSpace => "multi-space",
            Self::FixedWidth => "fixed-width",
        }
    }
}

pub(crate) type Grid = Vec<Vec<String>>;

pub(crate) fn split_lines(strategy: ParseStrategy, lines: &[&str]) -> Option<Grid> {
    let grid = match strategy {
        ParseStrategy::Csv => return None,
        ParseStrategy::Whitespace => split_each(lines, |line| {
            line.split_whitespace().map(str::to_string).collect()
        }),
        ParseStrategy::MultiSpace => split_each(lines, split_multi_space),
        ParseStrategy::FixedWidth => split_fixed_width(lines)?,
    };
    is_rectangular(&grid).then_some(grid)
}

pub(crate) fn parse_csv(body: &str) -> Result<Grid, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(|field| field.trim().to_string()).collect());
    }
    Ok(grid)
}

fn split_each(lines: &[&str], split: impl Fn(&str) -> Vec<String>) -> Grid {
    lines.iter().map(|line| split(line)).collect()
}

fn split_multi_space(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut pending_spaces = 0usize;
    for character in line.trim().chars() {
        if character.is_whitespace() {
            pending_spaces += 1;
            continue;
        }
        if pending_spaces >= 2 {
            fields.push(std::mem::take(&mut current));
        } else if pending_spaces == 1 {
            current.push(' ');
        }
        pending_spaces = 0;
        current.push(character);
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

/// Infers column spans from the union of non-blank character positions over
/// every line, then slices each line by those spans.
fn split_fixed_width(lines: &[&str]) -> Option<Grid> {
    let spans = fixed_width_spans(lines);
    if spans.is_empty() {
        return None;
    }
    Some(
        lines
            .iter()
            .map(|line| {
                let characters: Vec<char> = line.chars().collect();
                spans
                    .iter()
                    .map(|&(start, end)| {
                        let end = end.min(characters.len());
                        if start >= end {
                            String::new()
                        } else {
                            characters[start..end].iter().collect::<String>().trim().to_string()
                        }
                    })
                    .collect()
            })
            .collect(),
    )
}

pub(crate) fn fixed_width_spans(lines: &[&str]) -> Vec<(usize, usize)> {
    let width = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    let mut occupied = vec![false; width];
    for line in lines {
        for (index, character) in line.chars().enumerate() {
            if !character.is_whitespace() {
                occupied[index] = true;
            }
        }
    }

    let mut spans = Vec::new();
    let mut start = None;
    for (index, &filled) in occupied.iter().enumerate() {
        match (filled, start) {
            (true, None) => start = Some(index),
            (false, Some(begin)) => {
                spans.push((begin, index));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        spans.push((begin, width));
    }
    spans
}

fn is_rectangular(grid: &Grid) -> bool {
    let Some(header) = grid.first() else {
        return false;
    };
    !header.is_empty()
        && header.iter().all(|name| !name.is_empty())
        && grid.iter().all(|row| row.len() == header.len())
}

/// Character spans of whitespace-separated tokens, end exclusive.
pub(crate) fn token_spans(line: &str) -> Vec<(usize, usize, String)> {
    let mut spans = Vec::new();
    let mut current: Option<(usize, String)> = None;
    for (index, character) in line.chars().enumerate() {
        if character.is_whitespace() {
            if let Some((start, token)) = current.take() {
                spans.push((start, index, token));
            }
        } else {
            current
                .get_or_insert_with(|| (index, String::new()))
                .1
                .push(character);
        }
    }
    if let Some((start, token)) = current {
        let end = start + token.chars().count();
        spans.push((start, end, token));
    }
    spans
}

/// Places each units token into the column whose region `(previous end, end]`
/// of `reference` holds the token's end position. `Err` carries the number of
/// units tokens when they cannot be matched one-to-one with the columns.
pub(crate) fn align_units(
    units_line: &str,
    reference: &[(usize, usize)],
    column_count: usize,
) -> Result<Vec<Cell>, usize> {
    let tokens = token_spans(units_line);
    if reference.len() != column_count {
        if tokens.len() == column_count {
            return Ok(tokens.iter().map(|(_, _, token)| Cell::parse(token)).collect());
        }
        return Err(tokens.len());
    }

    let mut cells = vec![Cell::Missing; column_count];
    for (_, end, token) in &tokens {
        let column = reference
            .iter()
            .position(|&(_, column_end)| *end <= column_end)
            .unwrap_or(column_count - 1);
        if !cells[column].is_missing() {
            return Err(tokens.len());
        }
        cells[column] = Cell::parse(token);
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::{ParseStrategy, align_units, fixed_width_spans, split_lines, token_spans};
    use crate::table::cell::Cell;

    #[test]
    fn whitespace_strategy_requires_rectangular_rows() {
        let lines = ["name  plnt_typ  gro_trig", "agrl  warm_annual  temp_gro"];
        let grid = split_lines(ParseStrategy::Whitespace, &lines).expect("should split");
        assert_eq!(grid[1], vec!["agrl", "warm_annual", "temp_gro"]);

        let ragged = ["name  description", "agrl  Agricultural Land Generic"];
        assert!(split_lines(ParseStrategy::Whitespace, &ragged).is_none());
        let grid = split_lines(ParseStrategy::MultiSpace, &ragged).expect("multi-space split");
        assert_eq!(grid[1], vec!["agrl", "Agricultural Land Generic"]);
    }

    #[test]
    fn fixed_width_strategy_keeps_blank_cells() {
        let lines = [
            "   id      name     area",
            "    1      hru1     12.5",
            "    2               13.0",
        ];
        assert!(split_lines(ParseStrategy::Whitespace, &lines).is_none());
        assert!(split_lines(ParseStrategy::MultiSpace, &lines).is_none());
        let grid = split_lines(ParseStrategy::FixedWidth, &lines).expect("fixed-width split");
        assert_eq!(grid[2], vec!["2", "", "13.0"]);
        assert_eq!(fixed_width_spans(&lines).len(), 3);
    }

    #[test]
    fn token_spans_report_exclusive_ends() {
        let spans = token_spans("  ab   cde");
        assert_eq!(spans[0].0, 2);
        assert_eq!(spans[0].1, 4);
        assert_eq!(spans[1].1, 10);
    }

    #[test]
    fn units_are_aligned_by_end_position() {
        let reference: Vec<(usize, usize)> = token_spans("    1   2010   3.5   0.20")
            .into_iter()
            .map(|(start, end, _)| (start, end))
            .collect();
        let cells = align_units("           mm   m3/s", &reference, 4).expect("units should align");
        assert_eq!(
            cells,
            vec![
                Cell::Missing,
                Cell::Missing,
                Cell::Text("mm".to_string()),
                Cell::Text("m3/s".to_string()),
            ]
        );

        assert_eq!(align_units("mm mm mm mm mm", &reference, 4), Err(5));
    }
}

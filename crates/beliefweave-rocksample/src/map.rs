use thiserror::Error;

/// Error type for map parsing and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("map has no rows")]
    Empty,

    #[error("map rows have inconsistent widths")]
    RaggedRows,

    #[error("map is missing a start cell 'S'")]
    MissingStart,

    #[error("map declares more than one start cell")]
    DuplicateStart,

    #[error("unexpected character '{found}' at row {row}, column {column}")]
    UnexpectedCharacter {
        found: char,
        row: usize,
        column: usize,
    },

    #[error("duplicate rock index {index}")]
    DuplicateRock { index: usize },

    #[error("rock indices must be consecutive from 0, missing {missing}")]
    NonConsecutiveRocks { missing: usize },
}

/// A RockSample grid: rover start position and one cell per rock, indexed by
/// rock number. `x` grows eastward (columns), `y` grows southward (rows);
/// the rover exits by moving east off column `width - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RockSampleMap {
    pub width: u8,
    pub height: u8,
    pub start: (u8, u8),
    pub rocks: Vec<(u8, u8)>,
}

impl RockSampleMap {
    /// Parse the text grid format: `.` empty, `S` rover start, digits for
    /// rock numbers. Blank lines and surrounding whitespace are ignored.
    pub fn parse(text: &str) -> Result<Self, MapError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if rows.is_empty() {
            return Err(MapError::Empty);
        }
        let width = rows[0].chars().count();
        if rows.iter().any(|row| row.chars().count() != width) {
            return Err(MapError::RaggedRows);
        }

        let mut start = None;
        let mut rocks: Vec<Option<(u8, u8)>> = Vec::new();
        for (row, line) in rows.iter().enumerate() {
            for (column, cell) in line.chars().enumerate() {
                match cell {
                    '.' => {}
                    'S' => {
                        if start.replace((column as u8, row as u8)).is_some() {
                            return Err(MapError::DuplicateStart);
                        }
                    }
                    '0'..='9' => {
                        let index = cell as usize - '0' as usize;
                        if rocks.len() <= index {
                            rocks.resize(index + 1, None);
                        }
                        if rocks[index]
                            .replace((column as u8, row as u8))
                            .is_some()
                        {
                            return Err(MapError::DuplicateRock { index });
                        }
                    }
                    found => {
                        return Err(MapError::UnexpectedCharacter { found, row, column });
                    }
                }
            }
        }

        let start = start.ok_or(MapError::MissingStart)?;
        let rocks = rocks
            .into_iter()
            .enumerate()
            .map(|(index, rock)| rock.ok_or(MapError::NonConsecutiveRocks { missing: index }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RockSampleMap {
            width: width as u8,
            height: rows.len() as u8,
            start,
            rocks,
        })
    }

    pub fn rock_count(&self) -> usize {
        self.rocks.len()
    }

    /// Rock number at a cell, if any.
    pub fn rock_at(&self, x: u8, y: u8) -> Option<usize> {
        self.rocks.iter().position(|rock| *rock == (x, y))
    }

    pub fn in_bounds(&self, x: u8, y: u8) -> bool {
        x < self.width && y < self.height
    }
}

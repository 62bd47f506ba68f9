//! # Sourcing
//!
//! A source is a source file fronted by a `PeekableBuffer` that hides how
//! the file is actually loaded. It currently loads the entire file into
//! memory in a single read, as modern systems tend to make IO system calls
//! relatively expensive compared to allocating a larger piece of memory.
//!
//! As this is hidden behind the `PeekableBuffer` abstraction, it is possible
//! in the future to support lazily streaming sources as lexing and parsing
//! commence on already-streamed fragments without breaking compatibility.

use std::ops::Index;
use std::sync::Arc;

use crate::diagnostics::SourceLocation;

pub mod in_memory;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CharReadMany<'a>(pub &'a [char]);

impl<'a> Index<usize> for CharReadMany<'a> {
    type Output = char;

    fn index(&self, index: usize) -> &char {
        let CharReadMany(slice) = self;
        &slice[index]
    }
}

enum NewLine {
    // Unix
    LineFeed,

    // Windows
    CarriageReturnLineFeed,

    // Classic MacOS
    CarriageReturn,
}

fn check_newline(current: char, next: Option<char>) -> Option<NewLine> {
    if current == '\n' {
        Some(NewLine::LineFeed)
    } else if current == '\r' {
        if next.filter(|&c| c == '\n').is_some() {
            Some(NewLine::CarriageReturnLineFeed)
        } else {
            Some(NewLine::CarriageReturn)
        }
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Position {
    /// Suitable for calculating offsets in a lexer.
    absolute_character_index: usize,

    // For human consumption in error messages; not designed for calculating
    // offsets in a lexer.
    character_position_in_line: usize,
    line: usize,
}

impl Position {
    fn character_position(&self) -> usize {
        self.absolute_character_index + 1
    }

    fn increment_position_line(&mut self) {
        self.character_position_in_line = 1;
        self.line += 1;
    }

    fn update_all(&mut self, chars: CharReadMany<'_>) {
        let mut skip_next = false;
        let CharReadMany(char_slice) = chars;
        for (index, current) in char_slice.iter().enumerate() {
            self.absolute_character_index += 1;
            if skip_next {
                skip_next = false;
                continue;
            }
            let next = char_slice.get(index + 1).cloned();
            let newline = check_newline(*current, next);
            if let Some(NewLine::CarriageReturnLineFeed) = newline {
                skip_next = true;
            }
            if newline.is_some() {
                self.increment_position_line();
            } else {
                self.character_position_in_line += 1;
            }
        }
    }

    /// Attach a file name to turn this lexer-internal position into a
    /// diagnostic-facing location.
    pub fn to_location(self, file: &Arc<str>) -> SourceLocation {
        SourceLocation::new(file.clone(), self.line as u32, self.character_position_in_line as u32)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self {
            absolute_character_index: 0,
            character_position_in_line: 1,
            line: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::common::peekable_buffer::PeekableBuffer;
    use crate::source::in_memory::Source;

    use super::*;

    fn test_source(s: &str) -> Source {
        let source_chars = s.chars().collect::<Vec<char>>();
        Source::from(source_chars)
    }

    #[test]
    fn position_tracking() {
        let test_line = "test line";

        let unix_newline = '\n';
        let windows_newline = "\r\n";

        let mut source = test_source(&format!(
            "{}{}{}{}{}",
            test_line, unix_newline, test_line, windows_newline, test_line,
        ));

        assert_eq!(source.position, Position::default());

        source.discard_many(test_line.len() + 1);
        assert_eq!(source.position.line, 2);
        assert_eq!(source.position.character_position_in_line, 1);

        source.discard_many(test_line.len() + 2);
        assert_eq!(source.position.line, 3);
        assert_eq!(source.position.character_position_in_line, 1);
        assert_eq!(
            source.position.absolute_character_index + 1,
            source.position.character_position()
        );
    }

    #[test]
    fn converts_to_a_diagnostic_location() {
        let mut source = test_source("abc\ndef");
        source.discard_many(4);
        let file: std::sync::Arc<str> = std::sync::Arc::from("test.lm");
        let location = source.position.to_location(&file);
        assert_eq!(location.line, 2);
        assert_eq!(location.column, 1);
    }
}

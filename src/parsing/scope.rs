//! Brace matching across lines, aware of string literals and comments

use crate::parsing::parser::ParsingError;

/// Find the line holding the `}` that closes the first `{` at or after
/// `start`. The scan is character by character across line boundaries:
/// depth counting only begins once the first `{` is seen, so a stray `}`
/// before any opening is ignored. Braces inside string literals are not
/// counted, `//` ends the scan of a physical line, and `/* … */` consumes
/// the remainder of its own line without affecting depth.
///
/// Reaching the end of the input with the block still open is a fatal
/// parse failure.
///
/// Quote handling carries a deliberate heuristic: a `"` or `'` directly
/// preceded by a word character does not open a string, so the apostrophe
/// in "it's" is not misread. A quoted string starting flush against an
/// identifier is misparsed by this rule; that is a known limitation kept
/// for compatibility with the documents already out there.
pub fn find_block_end(lines: &[&str], start: usize) -> Result<usize, ParsingError> {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut string_char = ' ';
    let mut found_opening = false;

    for (index, line) in lines
        .iter()
        .enumerate()
        .skip(start)
    {
        let chars: Vec<char> = line.chars().collect();
        let mut j = 0;

        while j < chars.len() {
            let c = chars[j];
            let next = chars
                .get(j + 1)
                .copied()
                .unwrap_or('\0');

            // rest of the physical line is comment
            if c == '/' && next == '/' {
                break;
            }

            // block comment, consumed within this line only
            if c == '/' && next == '*' {
                j += 2;
                while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                    j += 1;
                }
                j += 2;
                continue;
            }

            if !in_string && (c == '"' || c == '\'') {
                let after_word = j > 0 && is_word_char(chars[j - 1]);
                if !after_word {
                    in_string = true;
                    string_char = c;
                }
            } else if in_string && c == string_char {
                in_string = false;
            }

            if in_string {
                j += 1;
                continue;
            }

            if c == '{' {
                found_opening = true;
                depth += 1;
            } else if c == '}' && found_opening {
                depth -= 1;
                if depth == 0 {
                    return Ok(index);
                }
            }

            j += 1;
        }
    }

    Err(ParsingError::UnmatchedBrace(start))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn simple_block() {
        let step = lines("{\nlet a = 1;\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));
    }

    #[test]
    fn nested_braces_are_counted() {
        let step = lines("{\nif (a) {\nb = 1;\n}\n}");
        assert_eq!(find_block_end(&step, 0), Ok(4));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let step = lines("{\nlet a = \"a{b}\";\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));

        let step = lines("{\nlet a = '}';\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));
    }

    #[test]
    fn braces_inside_comments_are_ignored() {
        let step = lines("{\n// {\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));

        let step = lines("{\n/* { */ a = 1;\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));
    }

    #[test]
    fn apostrophe_after_word_is_not_a_string() {
        // the quote in "it's" must not swallow the closing brace
        let step = lines("{\nlet note = 1; // it's fine\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));

        let step = lines("{\ndon't = 1;\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));
    }

    #[test]
    fn closing_before_any_opening_is_ignored() {
        let step = lines("}\n{\n}");
        assert_eq!(find_block_end(&step, 0), Ok(2));
    }

    #[test]
    fn unmatched_block_is_fatal() {
        let step = lines("{\nlet a = 1;");
        assert_eq!(
            find_block_end(&step, 0),
            Err(ParsingError::UnmatchedBrace(0))
        );

        // an opening hidden inside a string never arms the counter either
        let step = lines("\"{\"\ntext");
        assert_eq!(
            find_block_end(&step, 0),
            Err(ParsingError::UnmatchedBrace(0))
        );
    }

    #[test]
    fn strings_span_lines() {
        let step = lines("{\nlet a = \"multi\nline }\";\n}");
        assert_eq!(find_block_end(&step, 0), Ok(3));
    }
}

//! Line classification for procedure steps

/// The syntactic kind of a single line, decided by fixed prefix rules.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineKind {
    Question,
    RepeatHeader,
    CodeStart,
    ShowIfStart,
    End,
    Separator,
    BlockEnd,
    StyledText,
    PlainText,
}

/// Tag a line with its kind. Pure function of the trimmed line; the order
/// of the checks is a contract, so a line that could match two categories
/// always resolves to the earlier one.
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();

    if trimmed.starts_with("Q:") {
        return LineKind::Question;
    }
    if regex!(r"(?i)^\{\s*repeatstep\b")
        .is_match(trimmed)
    {
        return LineKind::RepeatHeader;
    }
    if trimmed == "{" {
        return LineKind::CodeStart;
    }
    if regex!(r"^\{\s*showif")
        .is_match(trimmed)
    {
        return LineKind::ShowIfStart;
    }
    if trimmed.starts_with("{end}") {
        return LineKind::End;
    }
    if trimmed == "---" {
        return LineKind::Separator;
    }
    if trimmed == "}" || trimmed == "{}" {
        return LineKind::BlockEnd;
    }
    if regex!(r"(?i)^\[(warning_style|error_style|info_style|success_style)\]")
        .is_match(trimmed)
    {
        return LineKind::StyledText;
    }

    LineKind::PlainText
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_prefixes() {
        assert_eq!(classify("Q: Name?[name]"), LineKind::Question);
        assert_eq!(classify("  {  "), LineKind::CodeStart);
        assert_eq!(classify("{showif a == 1}"), LineKind::ShowIfStart);
        assert_eq!(classify("{ showif a}"), LineKind::ShowIfStart);
        assert_eq!(classify("{end}"), LineKind::End);
        assert_eq!(classify("---"), LineKind::Separator);
        assert_eq!(classify("}"), LineKind::BlockEnd);
        assert_eq!(classify("{}"), LineKind::BlockEnd);
        assert_eq!(classify("plain words"), LineKind::PlainText);
        assert_eq!(classify(""), LineKind::PlainText);
    }

    #[test]
    fn repeat_header_is_case_insensitive() {
        assert_eq!(
            classify("{RepeatStep Until count == 3}"),
            LineKind::RepeatHeader
        );
        assert_eq!(classify("{repeatstep until done}"), LineKind::RepeatHeader);
    }

    #[test]
    fn styled_text_keys() {
        assert_eq!(classify("[warning_style] Careful"), LineKind::StyledText);
        assert_eq!(classify("[SUCCESS_STYLE] Done"), LineKind::StyledText);
        // not part of the style vocabulary, so just text
        assert_eq!(classify("[shiny_style] Hmm"), LineKind::PlainText);
        // a trailing variable declaration is also just text here
        assert_eq!(classify("Your city [city]"), LineKind::PlainText);
    }

    #[test]
    fn question_wins_over_everything() {
        // "Q:" is checked first even if the rest of the line looks like
        // another construct
        assert_eq!(classify("Q: {end} of it?[x]"), LineKind::Question);
    }
}

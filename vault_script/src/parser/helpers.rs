use pest::RuleType;
use pest::iterators::Pair;

/// 1-based line where a pair starts.
pub(super) fn line_of<R: RuleType>(pair: &Pair<'_, R>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Split a script block body into numbered lines, dropping blank ones.
/// The caller's chunk pads the gaps so numbering survives.
pub(super) fn body_lines(first_line: usize, body: &str) -> Vec<(usize, String)> {
    body.split('\n')
        .enumerate()
        .map(|(i, text)| (first_line + i, text.trim_end_matches('\r').trim_end()))
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(line, text)| (line, text.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_lines_skip_blanks_and_keep_numbers() {
        let lines = body_lines(10, "\n  a()\n\n  b()\r\n");
        assert_eq!(lines, vec![(11, "  a()".to_string()), (13, "  b()".to_string())]);
    }
}

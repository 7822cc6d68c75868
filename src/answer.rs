use std::io::{self, BufRead, Write};

/// A parsed reply to a yes/no question.
///
/// Parsing is lenient about case and leading whitespace and only looks at how the reply starts,
/// so `Yes please` is [`Answer::Yes`] and `nope` is [`Answer::No`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Invalid,
}

impl Answer {
    pub fn parse(input: &str) -> Self {
        let input = input.trim_start().to_lowercase();
        if input.starts_with("yes") {
            Answer::Yes
        } else if input.starts_with("no") {
            Answer::No
        } else {
            Answer::Invalid
        }
    }
}

/// Writes `question` followed by ` (yes/no): ` and parses a single line of input.
///
/// EOF counts as [`Answer::Invalid`].
pub fn prompt_yes_no(
    mut input: impl BufRead,
    mut output: impl Write,
    question: &str,
) -> io::Result<Answer> {
    write!(output, "{question} (yes/no): ")?;
    output.flush()?;

    let mut line = String::new();
    match input.read_line(&mut line)? {
        0 => Ok(Answer::Invalid),
        _ => Ok(Answer::parse(&line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn parse_answers() {
        fn run_test_case(input: &str, expected: Answer) {
            assert_that(Answer::parse(input))
                .with_detail_message(format!("Input: {input:?}"))
                .is_equal_to(expected);
        }

        run_test_case("yes", Answer::Yes);
        run_test_case("YES", Answer::Yes);
        run_test_case("  Yes please", Answer::Yes);
        run_test_case("yes\n", Answer::Yes);
        run_test_case("no", Answer::No);
        run_test_case("No\n", Answer::No);
        run_test_case("nope", Answer::No);
        run_test_case("y", Answer::Invalid);
        run_test_case("n", Answer::Invalid);
        run_test_case("", Answer::Invalid);
        run_test_case("maybe", Answer::Invalid);
    }

    #[test]
    fn prompt_reads_one_line() {
        let mut output = Vec::new();

        let answer =
            prompt_yes_no(&b"no\nyes\n"[..], &mut output, "Install missing tools?").unwrap();

        assert_that(answer).is_equal_to(Answer::No);
        assert_that(String::from_utf8(output).unwrap())
            .is_equal_to("Install missing tools? (yes/no): ");
    }

    #[test]
    fn prompt_at_eof_is_invalid() {
        let answer = prompt_yes_no(&b""[..], io::sink(), "Continue?").unwrap();

        assert_that(answer).is_equal_to(Answer::Invalid);
    }
}

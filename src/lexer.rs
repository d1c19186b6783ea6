#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Token {
    Space,
    Tab,
    Linefeed,
}

/// Maps source text to the ordered sequence of significant whitespace tokens.
/// Every other character is skipped, so arbitrary text doubles as commentary.
pub fn tokenize(source: &str) -> Vec<Token> {
    source
        .chars()
        .filter_map(|c| match c {
            ' ' => Some(Token::Space),
            '\t' => Some(Token::Tab),
            '\n' => Some(Token::Linefeed),
            _ => None,
        })
        .collect::<Vec<Token>>()
}

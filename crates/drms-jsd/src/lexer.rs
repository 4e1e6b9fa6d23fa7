//! Line tokenizer (spec §4.2 "Parser contract": whitespace/comma/tab
//! separators, single- or double-quoted strings). Grounded on the original
//! `gettoken`/`getstring` scanners (`drms_parser.c`), reworked as a single
//! token stream per line instead of in-place pointer advancement.

const SEPARATORS: [char; 3] = [' ', '\t', ','];

/// Splits one logical line into tokens. A quoted segment (`'...'` or
/// `"..."`) becomes one token with its surrounding quotes stripped and any
/// embedded separators preserved verbatim; everything else is split on
/// [`SEPARATORS`], collapsing runs of separators.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && SEPARATORS.contains(&chars[i]) {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        if chars[i] == '"' || chars[i] == '\'' {
            let quote = chars[i];
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != quote {
                j += 1;
            }
            tokens.push(chars[start..j].iter().collect());
            i = (j + 1).min(chars.len());
        } else {
            let start = i;
            while i < chars.len() && !SEPARATORS.contains(&chars[i]) {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        }
    }
    tokens
}

/// Strips a comment (everything from an unquoted `#` onward) and trims
/// trailing whitespace. Quoted `#` characters are left alone.
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_quote: Option<u8> = None;
    for (idx, &b) in bytes.iter().enumerate() {
        match in_quote {
            Some(q) if b == q => in_quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => in_quote = Some(b),
            None if b == b'#' => return line[..idx].trim_end(),
            None => {}
        }
    }
    line.trim_end()
}

/// A token cursor over one line's tokens, consumed left-to-right by the
/// section parsers.
pub struct TokenStream {
    tokens: Vec<String>,
    pos: usize,
}

impl TokenStream {
    pub fn new(line: &str) -> Self {
        Self {
            tokens: tokenize(line),
            pos: 0,
        }
    }

    pub fn next(&mut self) -> Option<&str> {
        let t = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(t.as_str())
    }

    pub fn rest_joined(&mut self) -> String {
        let rest = self.tokens[self.pos..].join(" ");
        self.pos = self.tokens.len();
        rest
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_commas_and_quotes() {
        let toks = tokenize(r#"T_REC, time, constant, record, 0.0, "0", UTC, "record start time""#);
        assert_eq!(
            toks,
            vec!["T_REC", "time", "constant", "record", "0.0", "0", "UTC", "record start time"]
        );
    }

    #[test]
    fn strip_comment_ignores_hash_in_quotes() {
        assert_eq!(strip_comment(r#"a "b#c" d # trailing"#), r#"a "b#c" d"#);
    }
}

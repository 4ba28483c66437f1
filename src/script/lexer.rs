use super::ast::CmpOp;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Pipe,
    Comma,
    Assign,
    Cmp(CmpOp),
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("`{s}`"),
            Token::Str(s) => format!("{s:?}"),
            Token::Num(n) => format!("{n}"),
            Token::Pipe => "`|`".into(),
            Token::Comma => "`,`".into(),
            Token::Assign => "`=`".into(),
            Token::Cmp(op) => format!("`{op}`"),
        }
    }
}

/// Split one source line into tokens. `#` starts a comment outside strings.
pub fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => break,
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Cmp(CmpOp::Eq));
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err("expected `!=`".into());
                }
                tokens.push(Token::Cmp(CmpOp::Ne));
            }
            '<' | '>' => {
                chars.next();
                let eq = chars.next_if_eq(&'=').is_some();
                tokens.push(Token::Cmp(match (c, eq) {
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    _ => CmpOp::Ge,
                }));
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err("unterminated string".into()),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(e @ ('"' | '\\')) => s.push(e),
                            Some(e) => return Err(format!("unknown escape `\\{e}`")),
                            None => return Err("unterminated string".into()),
                        },
                        Some(ch) => s.push(ch),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                while let Some(ch) = chars.next_if(|ch| ch.is_ascii_digit() || *ch == '.') {
                    s.push(ch);
                }
                let n: f64 = s.parse().map_err(|_| format!("bad number `{s}`"))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                    s.push(ch);
                }
                tokens.push(Token::Ident(s));
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn let_with_pipeline() {
        let tokens = tokenize("let q1 = df | where quarter == 1 # first quarter").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("let".into()),
                Token::Ident("q1".into()),
                Token::Assign,
                Token::Ident("df".into()),
                Token::Pipe,
                Token::Ident("where".into()),
                Token::Ident("quarter".into()),
                Token::Cmp(CmpOp::Eq),
                Token::Num(1.0),
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        let tokens = tokenize(r#"title "Q1 \"2024\" # not a comment""#).unwrap();
        assert_eq!(tokens[1], Token::Str("Q1 \"2024\" # not a comment".into()));
    }

    #[test]
    fn comparison_operators() {
        let tokens = tokenize("< <= > >= != ==").unwrap();
        let ops: Vec<_> = tokens
            .into_iter()
            .map(|t| match t {
                Token::Cmp(op) => op,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            ops,
            vec![CmpOp::Lt, CmpOp::Le, CmpOp::Gt, CmpOp::Ge, CmpOp::Ne, CmpOp::Eq]
        );
    }

    #[test]
    fn negative_and_decimal_numbers() {
        assert_eq!(
            tokenize("-2.5 .5").unwrap(),
            vec![Token::Num(-2.5), Token::Num(0.5)]
        );
        assert!(tokenize("1.2.3").is_err());
    }

    #[test]
    fn rejects_foreign_syntax() {
        assert!(tokenize("import os; os.system('rm')").is_err());
        assert!(tokenize("\"open").is_err());
        assert!(tokenize("a ! b").is_err());
    }
}

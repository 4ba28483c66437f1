use super::ScriptError;
use super::ast::{AggFunc, Expr, Line, Literal, Op, SortOrder, Statement};
use super::lexer::{Token, tokenize};
use crate::render::{ChartKind, MAX_SIDE};

/// Upper bound on statements in one script.
pub const MAX_STATEMENTS: usize = 256;

const MAX_HEAD: usize = 1_000_000;

/// Parse a whole script. Nothing runs unless every line parses.
pub fn parse(source: &str) -> Result<Vec<Line>, ScriptError> {
    let mut lines = Vec::new();
    for (i, text) in source.lines().enumerate() {
        let number = i + 1;
        let tokens = tokenize(text).map_err(|message| ScriptError::Syntax {
            line: number,
            message,
        })?;
        if tokens.is_empty() {
            continue;
        }
        let statement = Cursor::new(tokens)
            .statement()
            .map_err(|message| ScriptError::Syntax {
                line: number,
                message,
            })?;
        lines.push(Line { number, statement });
        if lines.len() > MAX_STATEMENTS {
            return Err(ScriptError::TooLong(MAX_STATEMENTS));
        }
    }
    Ok(lines)
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, String> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            Some(other) => Err(format!("expected {what}, found {}", other.describe())),
            None => Err(format!("expected {what}")),
        }
    }

    fn keyword(&mut self, kw: &str) -> Result<(), String> {
        match self.next() {
            Some(Token::Ident(s)) if s == kw => Ok(()),
            Some(other) => Err(format!("expected `{kw}`, found {}", other.describe())),
            None => Err(format!("expected `{kw}`")),
        }
    }

    fn string(&mut self, what: &str) -> Result<String, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            Some(other) => Err(format!(
                "expected quoted {what}, found {}",
                other.describe()
            )),
            None => Err(format!("expected quoted {what}")),
        }
    }

    /// Column names may be bare identifiers or quoted.
    fn column(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Ident(s) | Token::Str(s)) => Ok(s),
            Some(other) => Err(format!("expected column name, found {}", other.describe())),
            None => Err("expected column name".into()),
        }
    }

    fn count(&mut self, what: &str, max: usize) -> Result<usize, String> {
        match self.next() {
            Some(Token::Num(n)) if n >= 0.0 && n.fract() == 0.0 && n <= max as f64 => {
                Ok(n as usize)
            }
            Some(other) => Err(format!(
                "expected {what} (whole number up to {max}), found {}",
                other.describe()
            )),
            None => Err(format!("expected {what}")),
        }
    }

    fn end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("unexpected {} at end of statement", t.describe())),
        }
    }

    fn statement(mut self) -> Result<Statement, String> {
        let keyword = self.ident("statement")?;
        let statement = match keyword.as_str() {
            "let" => {
                let name = self.ident("binding name")?;
                if !self.eat(&Token::Assign) {
                    return Err("expected `=` after binding name".into());
                }
                Statement::Let {
                    name,
                    expr: self.expr()?,
                }
            }
            "chart" => {
                let kind = self.ident("chart kind")?;
                Statement::Chart(match kind.as_str() {
                    "bar" => ChartKind::Bar,
                    "line" => ChartKind::Line,
                    "scatter" => ChartKind::Scatter,
                    other => return Err(format!("unknown chart kind `{other}`")),
                })
            }
            "size" => {
                let width = self.count("width", MAX_SIDE as usize)?;
                let height = self.count("height", MAX_SIDE as usize)?;
                if width == 0 || height == 0 {
                    return Err("size must be positive".into());
                }
                Statement::Size {
                    width: width as u32,
                    height: height as u32,
                }
            }
            "title" => Statement::Title(self.string("title")?),
            "xlabel" => Statement::XLabel(self.string("label")?),
            "ylabel" => Statement::YLabel(self.string("label")?),
            "series" => {
                let label = self.string("series label")?;
                Statement::Series {
                    label,
                    expr: self.expr()?,
                }
            }
            "legend" if self.peek().is_none() => Statement::Legend(true),
            "legend" => match self.ident("`on` or `off`")?.as_str() {
                "on" => Statement::Legend(true),
                "off" => Statement::Legend(false),
                other => return Err(format!("expected `on` or `off`, found `{other}`")),
            },
            "save" => Statement::Save(self.string("path")?),
            other => return Err(format!("unknown statement `{other}`")),
        };
        self.end()?;
        Ok(statement)
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let source = self.ident("binding")?;
        let mut ops = Vec::new();
        while self.eat(&Token::Pipe) {
            ops.push(self.op()?);
        }
        Ok(Expr { source, ops })
    }

    fn op(&mut self) -> Result<Op, String> {
        let name = self.ident("operation")?;
        let op = match name.as_str() {
            "where" => {
                let column = self.column()?;
                let cmp = match self.next() {
                    Some(Token::Cmp(c)) => c,
                    Some(other) => {
                        return Err(format!("expected comparison, found {}", other.describe()));
                    }
                    None => return Err("expected comparison".into()),
                };
                let value = match self.next() {
                    Some(Token::Num(n)) => Literal::Num(n),
                    Some(Token::Str(s)) => Literal::Str(s),
                    Some(other) => {
                        return Err(format!(
                            "expected number or quoted string, found {}",
                            other.describe()
                        ));
                    }
                    None => return Err("expected value to compare with".into()),
                };
                Op::Where { column, cmp, value }
            }
            "select" => {
                let mut columns = vec![self.column()?];
                while self.eat(&Token::Comma) {
                    columns.push(self.column()?);
                }
                Op::Select(columns)
            }
            "head" => Op::Head(self.count("row count", MAX_HEAD)?),
            "sum" | "mean" | "min" | "max" => {
                let func = match name.as_str() {
                    "sum" => AggFunc::Sum,
                    "mean" => AggFunc::Mean,
                    "min" => AggFunc::Min,
                    _ => AggFunc::Max,
                };
                let column = self.column()?;
                self.keyword("by")?;
                Op::Aggregate {
                    func,
                    column,
                    by: self.column()?,
                }
            }
            "count" => {
                self.keyword("by")?;
                Op::Count {
                    by: self.column()?,
                }
            }
            "xy" => {
                let x = self.column()?;
                Op::Xy {
                    x,
                    y: self.column()?,
                }
            }
            "sort" => Op::Sort(match self.ident("`asc`, `desc` or `keys`")?.as_str() {
                "asc" => SortOrder::Asc,
                "desc" => SortOrder::Desc,
                "keys" => SortOrder::Keys,
                other => return Err(format!("unknown sort order `{other}`")),
            }),
            other => return Err(format!("unknown operation `{other}`")),
        };
        Ok(op)
    }
}

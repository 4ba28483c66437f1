//! Sandboxed chart scripts.
//!
//! Model-written chart code never runs as native code. It is parsed into a
//! small line-oriented language and interpreted against an explicit
//! allow-list: the prepared dataset bound as `df`, and a single output path.
//! There is no filesystem, process or network access beyond that one file.
//!
//! ```text
//! let q1 = df | where quarter == 1
//! chart bar
//! title "Q1 coffee sales"
//! series "2024" q1 | where year == 2024 | sum money by coffee_name
//! series "2025" q1 | where year == 2025 | sum money by coffee_name
//! legend
//! save "drink_sales_v1.png"
//! ```

mod ast;
mod eval;
mod lexer;
mod parser;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

pub use ast::{AggFunc, CmpOp, Expr, Line, Literal, Op, SortOrder, Statement};
pub use eval::{Scope, Value};
pub use parser::{MAX_STATEMENTS, parse};

use crate::config::RenderConfig;
use crate::dataset::Frame;
use crate::render::{self, ChartSpec, MAX_SERIES, NamedSeries};
use eval::{EvalError, eval_expr};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: unknown binding `{name}`")]
    UnknownBinding { line: usize, name: String },
    #[error("line {line}: {message}")]
    Eval { line: usize, message: String },
    #[error("line {line}: output path {path:?} is not allowed, expected {allowed:?}")]
    OutputNotAllowed {
        line: usize,
        path: String,
        allowed: String,
    },
    #[error("line {line}: render failed: {message}")]
    Render { line: usize, message: String },
    #[error("script has more than {0} statements")]
    TooLong(usize),
}

impl ScriptError {
    /// Source line the error points at, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. }
            | Self::UnknownBinding { line, .. }
            | Self::Eval { line, .. }
            | Self::OutputNotAllowed { line, .. }
            | Self::Render { line, .. } => Some(*line),
            Self::TooLong(_) => None,
        }
    }
}

/// What one script run produced.
#[derive(Debug, Clone)]
pub struct Execution {
    pub chart: ChartSpec,
    /// Set when a `save` statement wrote the image.
    pub saved: Option<PathBuf>,
    /// Names bound when the script finished, `df` included.
    pub bindings: Vec<String>,
}

/// Runs chart scripts against a read-only dataset.
pub struct Sandbox {
    df: Arc<Frame>,
    defaults: RenderConfig,
}

impl Sandbox {
    pub fn new(df: Arc<Frame>, defaults: RenderConfig) -> Self {
        Self { df, defaults }
    }

    /// Parse and run `source` in a fresh scope. `save` may only target
    /// `output`, and nothing is written unless every line succeeds.
    pub fn run(&self, source: &str, output: &Path) -> Result<Execution, ScriptError> {
        let lines = parse(source)?;
        let mut scope = Scope::with_dataset(Arc::clone(&self.df));
        let mut chart = ChartSpec::new(self.defaults.width, self.defaults.height);
        // Chart as it stood at the last `save`, with that statement's line.
        let mut pending: Option<(usize, ChartSpec)> = None;

        for Line { number, statement } in lines {
            match statement {
                Statement::Let { name, expr } => {
                    let value = eval_at(&expr, &scope, number)?;
                    scope.bind(name, value);
                }
                Statement::Chart(kind) => chart.kind = kind,
                Statement::Size { width, height } => {
                    chart.width = width;
                    chart.height = height;
                }
                Statement::Title(t) => chart.title = Some(t),
                Statement::XLabel(t) => chart.x_label = Some(t),
                Statement::YLabel(t) => chart.y_label = Some(t),
                Statement::Series { label, expr } => {
                    let series = match eval_at(&expr, &scope, number)? {
                        Value::Series(s) => s,
                        Value::Table(_) => {
                            return Err(ScriptError::Eval {
                                line: number,
                                message: format!(
                                    "series {label:?} needs a series, got a table (try `sum <col> by <col>` or `xy <x> <y>`)"
                                ),
                            });
                        }
                    };
                    if chart.series.len() >= MAX_SERIES {
                        return Err(ScriptError::Eval {
                            line: number,
                            message: format!("at most {MAX_SERIES} series per chart"),
                        });
                    }
                    chart.series.push(NamedSeries { label, series });
                }
                Statement::Legend(on) => chart.legend = on,
                Statement::Save(path) => {
                    if !same_path(Path::new(&path), output) {
                        return Err(ScriptError::OutputNotAllowed {
                            line: number,
                            path,
                            allowed: output.display().to_string(),
                        });
                    }
                    pending = Some((number, chart.clone()));
                }
            }
        }

        let saved = match pending {
            Some((line, snapshot)) => {
                render::save(&snapshot, output).map_err(|e| ScriptError::Render {
                    line,
                    message: e.to_string(),
                })?;
                debug!(path = %output.display(), series = snapshot.series.len(), "chart saved");
                Some(output.to_path_buf())
            }
            None => None,
        };

        Ok(Execution {
            chart,
            saved,
            bindings: scope.names(),
        })
    }
}

fn eval_at(expr: &Expr, scope: &Scope, line: usize) -> Result<Value, ScriptError> {
    eval_expr(expr, scope).map_err(|e| match e {
        EvalError::UnknownBinding(name) => ScriptError::UnknownBinding { line, name },
        EvalError::Other(message) => ScriptError::Eval { line, message },
    })
}

/// Compare paths ignoring `.` components.
fn same_path(a: &Path, b: &Path) -> bool {
    fn clean(p: &Path) -> Vec<Component<'_>> {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
    clean(a) == clean(b)
}

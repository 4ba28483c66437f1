use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use super::ast::{AggFunc, CmpOp, Expr, Literal, Op, SortOrder};
use crate::dataset::{Cell, Frame};
use crate::render::{MAX_POINTS, Point, Series};

/// A runtime value: a table or a keyed series.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Table(Arc<Frame>),
    Series(Series),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Table(_) => "table",
            Value::Series(_) => "series",
        }
    }
}

/// Bindings visible to one script execution.
pub struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    /// A fresh scope whose only binding is `df`.
    pub fn with_dataset(df: Arc<Frame>) -> Self {
        let mut vars = HashMap::new();
        vars.insert("df".to_string(), Value::Table(df));
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn bind(&mut self, name: String, value: Value) {
        self.vars.insert(name, value);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort();
        names
    }
}

pub enum EvalError {
    UnknownBinding(String),
    Other(String),
}

pub fn eval_expr(expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    let mut value = scope
        .get(&expr.source)
        .cloned()
        .ok_or_else(|| EvalError::UnknownBinding(expr.source.clone()))?;
    for op in &expr.ops {
        value = apply(op, value).map_err(EvalError::Other)?;
    }
    if let Value::Series(s) = &value {
        if s.points.len() > MAX_POINTS {
            return Err(EvalError::Other(format!(
                "series has {} points, limit is {MAX_POINTS}",
                s.points.len()
            )));
        }
        if let Some(p) = s.points.iter().find(|p| !p.y.is_finite()) {
            return Err(EvalError::Other(format!(
                "value for `{}` is not a finite number ({})",
                p.label, p.y
            )));
        }
    }
    Ok(value)
}

fn column(frame: &Frame, name: &str) -> Result<usize, String> {
    frame.column_index(name).ok_or_else(|| {
        format!(
            "unknown column `{name}` (have: {})",
            frame.columns().join(", ")
        )
    })
}

fn compare(cell: &Cell, value: &Literal) -> Option<Ordering> {
    match (cell, value) {
        (Cell::Num(a), Literal::Num(b)) => a.partial_cmp(b),
        (Cell::Text(a), Literal::Str(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

fn matches(cell: &Cell, cmp: CmpOp, value: &Literal) -> bool {
    let Some(ord) = compare(cell, value) else {
        return cmp == CmpOp::Ne;
    };
    match cmp {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    }
}

fn point_for(key: &Cell, y: f64) -> Point {
    Point {
        label: key.key(),
        x: key.as_num(),
        y,
    }
}

/// Group numeric `column` values by `by`, keeping first-seen group order.
fn group(frame: &Frame, by: &str, column: Option<&str>) -> Result<Vec<(Cell, Vec<f64>)>, String> {
    let by_idx = self::column(frame, by)?;
    let val_idx = column.map(|c| self::column(frame, c)).transpose()?;

    let mut order: Vec<(Cell, Vec<f64>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in frame.rows() {
        let key = &row[by_idx];
        if *key == Cell::Empty {
            continue;
        }
        let value = match val_idx {
            Some(i) => match row[i].as_num() {
                Some(v) => v,
                None => continue,
            },
            None => 1.0,
        };
        let slot = *index.entry(key.key()).or_insert_with(|| {
            order.push((key.clone(), Vec::new()));
            order.len() - 1
        });
        order[slot].1.push(value);
    }
    Ok(order)
}

fn aggregate(func: AggFunc, values: &[f64]) -> f64 {
    match func {
        AggFunc::Sum => values.iter().sum(),
        AggFunc::Mean => values.iter().sum::<f64>() / values.len() as f64,
        AggFunc::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggFunc::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

fn expect_table(op: &Op, value: Value) -> Result<Arc<Frame>, String> {
    match value {
        Value::Table(t) => Ok(t),
        other => Err(format!(
            "`{}` needs a table, got a {}",
            op.keyword(),
            other.kind()
        )),
    }
}

fn apply(op: &Op, value: Value) -> Result<Value, String> {
    match op {
        Op::Head(n) => Ok(match value {
            Value::Table(t) => Value::Table(Arc::new(t.head(*n))),
            Value::Series(mut s) => {
                s.points.truncate(*n);
                Value::Series(s)
            }
        }),
        Op::Sort(order) => {
            let mut s = match value {
                Value::Series(s) => s,
                other => return Err(format!("`sort` needs a series, got a {}", other.kind())),
            };
            match order {
                SortOrder::Asc => s.points.sort_by(|a, b| a.y.total_cmp(&b.y)),
                SortOrder::Desc => s.points.sort_by(|a, b| b.y.total_cmp(&a.y)),
                SortOrder::Keys => s.points.sort_by(|a, b| match (a.x, b.x) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    _ => a.label.cmp(&b.label),
                }),
            }
            Ok(Value::Series(s))
        }
        Op::Where { column, cmp, value: lit } => {
            let frame = expect_table(op, value)?;
            let idx = self::column(&frame, column)?;
            Ok(Value::Table(Arc::new(
                frame.filter_rows(|row| matches(&row[idx], *cmp, lit)),
            )))
        }
        Op::Select(columns) => {
            let frame = expect_table(op, value)?;
            Ok(Value::Table(Arc::new(frame.select(columns)?)))
        }
        Op::Aggregate { func, column, by } => {
            let frame = expect_table(op, value)?;
            let points = group(&frame, by, Some(column))?
                .into_iter()
                .map(|(key, values)| point_for(&key, aggregate(*func, &values)))
                .collect();
            Ok(Value::Series(Series { points }))
        }
        Op::Count { by } => {
            let frame = expect_table(op, value)?;
            let points = group(&frame, by, None)?
                .into_iter()
                .map(|(key, values)| point_for(&key, values.len() as f64))
                .collect();
            Ok(Value::Series(Series { points }))
        }
        Op::Xy { x, y } => {
            let frame = expect_table(op, value)?;
            let (xi, yi) = (self::column(&frame, x)?, self::column(&frame, y)?);
            let points = frame
                .rows()
                .iter()
                .filter(|row| row[xi] != Cell::Empty)
                .filter_map(|row| row[yi].as_num().map(|v| point_for(&row[xi], v)))
                .collect();
            Ok(Value::Series(Series { points }))
        }
    }
}

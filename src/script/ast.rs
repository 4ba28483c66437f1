use std::fmt;

use crate::render::ChartKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Mean,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
    Keys,
}

/// One `| op` stage of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Where {
        column: String,
        cmp: CmpOp,
        value: Literal,
    },
    Select(Vec<String>),
    Head(usize),
    Aggregate {
        func: AggFunc,
        column: String,
        by: String,
    },
    Count {
        by: String,
    },
    Xy {
        x: String,
        y: String,
    },
    Sort(SortOrder),
}

impl Op {
    pub fn keyword(&self) -> &'static str {
        match self {
            Op::Where { .. } => "where",
            Op::Select(_) => "select",
            Op::Head(_) => "head",
            Op::Aggregate { func, .. } => match func {
                AggFunc::Sum => "sum",
                AggFunc::Mean => "mean",
                AggFunc::Min => "min",
                AggFunc::Max => "max",
            },
            Op::Count { .. } => "count",
            Op::Xy { .. } => "xy",
            Op::Sort(_) => "sort",
        }
    }
}

/// `source | op | op ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub source: String,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let { name: String, expr: Expr },
    Chart(ChartKind),
    Size { width: u32, height: u32 },
    Title(String),
    XLabel(String),
    YLabel(String),
    Series { label: String, expr: Expr },
    Legend(bool),
    Save(String),
}

/// A statement with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub statement: Statement,
}

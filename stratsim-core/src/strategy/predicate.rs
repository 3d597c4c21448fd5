//! Predicates as data — entry/exit conditions evaluated against one bar.
//!
//! A strategy never holds code, only an expression tree. This keeps every
//! strategy serializable, hashable into the config fingerprint and able to
//! report the columns it reads before any bar is touched.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Arithmetic over bar columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Column(String),
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn constant(value: f64) -> Self {
        Self::Const(value)
    }

    pub fn add(self, rhs: Expr) -> Self {
        Self::Add(Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Self {
        Self::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn mul(self, rhs: Expr) -> Self {
        Self::Mul(Box::new(self), Box::new(rhs))
    }

    /// Evaluate against a bar. `None` when a referenced column is absent;
    /// NaN propagates through the arithmetic.
    pub fn eval(&self, bar: &Bar) -> Option<f64> {
        match self {
            Self::Column(name) => bar.value(name),
            Self::Const(v) => Some(*v),
            Self::Add(a, b) => Some(a.eval(bar)? + b.eval(bar)?),
            Self::Sub(a, b) => Some(a.eval(bar)? - b.eval(bar)?),
            Self::Mul(a, b) => Some(a.eval(bar)? * b.eval(bar)?),
        }
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Column(name) => {
                out.insert(name.clone());
            }
            Self::Const(_) => {}
            Self::Add(a, b) | Self::Sub(a, b) | Self::Mul(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => f.write_str(name),
            Self::Const(v) => write!(f, "{v}"),
            Self::Add(a, b) => write!(f, "({a} + {b})"),
            Self::Sub(a, b) => write!(f, "({a} - {b})"),
            Self::Mul(a, b) => write!(f, "({a} * {b})"),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Lt => left < right,
            Self::Ge => left >= right,
            Self::Le => left <= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown comparison operator '{0}'")]
pub struct UnknownOperator(pub String);

impl FromStr for CmpOp {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// Boolean condition over one bar.
///
/// Any NaN operand makes a comparison false, including `!=`. Indicator
/// warm-up therefore never triggers an entry or an exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Compare { left: Expr, op: CmpOp, right: Expr },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
    Never,
}

impl Predicate {
    pub fn compare(left: Expr, op: CmpOp, right: Expr) -> Self {
        Self::Compare { left, op, right }
    }

    /// `column <op> constant`, the shape of almost every built-in rule.
    pub fn threshold(column: &str, op: CmpOp, target: f64) -> Self {
        Self::compare(Expr::col(column), op, Expr::constant(target))
    }

    pub fn all(of: Vec<Predicate>) -> Self {
        Self::All { of }
    }

    pub fn any(of: Vec<Predicate>) -> Self {
        Self::Any { of }
    }

    pub fn eval(&self, bar: &Bar) -> bool {
        match self {
            Self::Compare { left, op, right } => match (left.eval(bar), right.eval(bar)) {
                (Some(l), Some(r)) if !l.is_nan() && !r.is_nan() => op.apply(l, r),
                _ => false,
            },
            Self::All { of } => !of.is_empty() && of.iter().all(|p| p.eval(bar)),
            Self::Any { of } => of.iter().any(|p| p.eval(bar)),
            Self::Never => false,
        }
    }

    /// Every column referenced anywhere in the tree.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::All { of } | Self::Any { of } => {
                for p in of {
                    p.collect_columns(out);
                }
            }
            Self::Never => {}
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            Self::All { of } | Self::Any { of } => {
                let sep = if matches!(self, Self::All { .. }) {
                    " AND "
                } else {
                    " OR "
                };
                let parts: Vec<String> = of.iter().map(|p| p.to_string()).collect();
                write!(f, "[{}]", parts.join(sep))
            }
            Self::Never => f.write_str("never"),
        }
    }
}

/// How a rule joins the conditions before it. Anything but `OR` reads as `AND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Link {
    #[default]
    And,
    Or,
}

impl From<String> for Link {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("OR") {
            Self::Or
        } else {
            Self::And
        }
    }
}

impl From<Link> for String {
    fn from(link: Link) -> Self {
        match link {
            Link::And => "AND".to_string(),
            Link::Or => "OR".to_string(),
        }
    }
}

/// One user-declared condition: `indicator <operator> target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub link: Link,
    pub indicator: String,
    pub operator: CmpOp,
    pub target: f64,
}

/// Left-to-right fold of rules into a single predicate.
///
/// The first rule's link is ignored. An `OR` link wraps the accumulated
/// condition and the new one in `Any`, anything else in `All`, so
/// `a AND b OR c` reads as `(a AND b) OR c`. An empty chain never fires.
pub fn fold_rules(rules: &[Rule]) -> Predicate {
    let mut iter = rules.iter();
    let Some(first) = iter.next() else {
        return Predicate::Never;
    };
    let mut acc = Predicate::threshold(&first.indicator, first.operator, first.target);
    for rule in iter {
        let cond = Predicate::threshold(&rule.indicator, rule.operator, rule.target);
        acc = match rule.link {
            Link::Or => Predicate::any(vec![acc, cond]),
            Link::And => Predicate::all(vec![acc, cond]),
        };
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar_with(rsi: f64, close: f64) -> Bar {
        Bar::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            close,
            close,
            close,
            close,
        )
        .with_indicator("RSI_14", rsi)
        .with_indicator("SMA10", 100.0)
        .with_indicator("Rolling_Std_10", 2.0)
    }

    fn rule(link: Link, op: CmpOp, target: f64) -> Rule {
        Rule {
            link,
            indicator: "RSI_14".into(),
            operator: op,
            target,
        }
    }

    #[test]
    fn threshold_compares_column_to_constant() {
        let p = Predicate::threshold("RSI_14", CmpOp::Lt, 35.0);
        assert!(p.eval(&bar_with(30.0, 10.0)));
        assert!(!p.eval(&bar_with(35.0, 10.0)));
    }

    #[test]
    fn nan_is_false_for_every_operator() {
        let bar = bar_with(f64::NAN, 10.0);
        for op in [CmpOp::Gt, CmpOp::Lt, CmpOp::Ge, CmpOp::Le, CmpOp::Eq, CmpOp::Ne] {
            assert!(!Predicate::threshold("RSI_14", op, 50.0).eval(&bar), "{op}");
        }
    }

    #[test]
    fn missing_column_is_false() {
        let p = Predicate::threshold("CMF_20", CmpOp::Gt, 0.0);
        assert!(!p.eval(&bar_with(50.0, 10.0)));
    }

    #[test]
    fn band_expression() {
        // Close < SMA10 - 2 * Rolling_Std_10  →  Close < 96
        let p = Predicate::compare(
            Expr::col("Close"),
            CmpOp::Lt,
            Expr::col("SMA10").sub(Expr::constant(2.0).mul(Expr::col("Rolling_Std_10"))),
        );
        assert!(p.eval(&bar_with(50.0, 95.0)));
        assert!(!p.eval(&bar_with(50.0, 96.0)));
    }

    #[test]
    fn empty_all_never_fires() {
        assert!(!Predicate::all(vec![]).eval(&bar_with(50.0, 10.0)));
        assert!(!Predicate::Never.eval(&bar_with(50.0, 10.0)));
    }

    #[test]
    fn columns_are_collected_from_nested_trees() {
        let p = Predicate::all(vec![
            Predicate::threshold("RSI_14", CmpOp::Lt, 35.0),
            Predicate::any(vec![
                Predicate::threshold("CMF_20", CmpOp::Gt, 0.0),
                Predicate::compare(Expr::col("Close"), CmpOp::Lt, Expr::col("SMA10")),
            ]),
        ]);
        let cols: Vec<String> = p.columns().into_iter().collect();
        assert_eq!(cols, vec!["CMF_20", "Close", "RSI_14", "SMA10"]);
    }

    #[test]
    fn fold_is_left_associative() {
        // (RSI > 20 AND RSI < 30) OR RSI > 90
        let chain = vec![
            rule(Link::And, CmpOp::Gt, 20.0),
            rule(Link::And, CmpOp::Lt, 30.0),
            rule(Link::Or, CmpOp::Gt, 90.0),
        ];
        let p = fold_rules(&chain);
        assert!(p.eval(&bar_with(25.0, 1.0)));
        assert!(p.eval(&bar_with(95.0, 1.0)));
        assert!(!p.eval(&bar_with(50.0, 1.0)));
        assert!(!p.eval(&bar_with(10.0, 1.0)));
    }

    #[test]
    fn first_link_is_ignored() {
        let p = fold_rules(&[rule(Link::Or, CmpOp::Lt, 30.0)]);
        assert_eq!(p, Predicate::threshold("RSI_14", CmpOp::Lt, 30.0));
    }

    #[test]
    fn empty_chain_is_never() {
        assert_eq!(fold_rules(&[]), Predicate::Never);
    }

    #[test]
    fn operator_parsing() {
        assert_eq!(">=".parse::<CmpOp>(), Ok(CmpOp::Ge));
        assert_eq!(" != ".parse::<CmpOp>(), Ok(CmpOp::Ne));
        assert!("=>".parse::<CmpOp>().is_err());
    }

    #[test]
    fn unknown_link_reads_as_and() {
        let r: Rule = serde_json::from_str(
            r#"{"link":"XOR","indicator":"RSI_14","operator":"<","target":30.0}"#,
        )
        .unwrap();
        assert_eq!(r.link, Link::And);
        let r: Rule =
            serde_json::from_str(r#"{"link":"or","indicator":"RSI_14","operator":">","target":70.0}"#)
                .unwrap();
        assert_eq!(r.link, Link::Or);
    }

    #[test]
    fn predicate_serde_roundtrip() {
        let p = Predicate::all(vec![
            Predicate::threshold("RSI_14", CmpOp::Lt, 35.0),
            Predicate::Never,
        ]);
        let json = serde_json::to_string(&p).unwrap();
        let back: Predicate = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}

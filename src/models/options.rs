//! Declarative query specification: fields, conditions, orders, groups,
//! pagination and primary forcing.

use crate::error::DbError;
use crate::models::Value;
use std::str::FromStr;

/// Condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    #[default]
    Eq,
    Neq,
    Gt,
    Lt,
    Geq,
    Leq,
    Like,
    Is,
    IsNot,
    In,
    NotIn,
    Null,
    NotNull,
    Raw,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Geq => ">=",
            Self::Leq => "<=",
            Self::Like => "LIKE",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Null => "NULL",
            Self::NotNull => "NOT NULL",
            Self::Raw => "RAW",
        }
    }
}

impl FromStr for Operator {
    type Err = DbError;

    /// An empty operator means equality.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "" | "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Neq),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Geq),
            "<=" => Ok(Self::Leq),
            "LIKE" => Ok(Self::Like),
            "IS" => Ok(Self::Is),
            "IS NOT" => Ok(Self::IsNot),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "NULL" => Ok(Self::Null),
            "NOT NULL" => Ok(Self::NotNull),
            "RAW" => Ok(Self::Raw),
            _ => Err(DbError::invalid_input(format!("unknown operator: {}", s))),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single `(column, operator, value)` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    /// Verbatim SQL predicate. The caller is responsible for its safety.
    pub fn raw(fragment: impl Into<String>) -> Self {
        Self::new("", Operator::Raw, Value::Text(fragment.into()))
    }
}

/// Ordered predicates, joined with `AND` in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditions holding a single predicate.
    pub fn single(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::new().and(column, op, value)
    }

    /// Conditions holding a single equality predicate.
    pub fn single_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and_eq(column, value)
    }

    pub fn and(mut self, column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.push(Condition::new(column, op, value));
        self
    }

    pub fn and_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(column, Operator::Eq, value)
    }

    pub fn push(&mut self, condition: Condition) {
        self.0.push(condition);
    }

    pub fn add_eq(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.push(Condition::eq(column, value));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: SortDirection,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// A single-use query specification.
///
/// `page` is 1-based; pagination applies only when both `page` and
/// `page_size` are positive. `force` routes reads to the primary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub fields: Vec<String>,
    pub conditions: Conditions,
    pub orders: Vec<Order>,
    pub groups: Vec<String>,
    pub page: u32,
    pub page_size: u32,
    pub force: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selected fields. Duplicates are dropped, first occurrence wins.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.clear();
        for field in fields {
            self = self.add_field(field);
        }
        self
    }

    pub fn add_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn add_condition(
        mut self,
        column: impl Into<String>,
        op: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.conditions.push(Condition::new(column, op, value));
        self
    }

    pub fn add_eq_condition(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_condition(column, Operator::Eq, value)
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_orders(mut self, orders: Vec<Order>) -> Self {
        self.orders = orders;
        self
    }

    pub fn add_order(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.orders.push(Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn add_asc_order(self, column: impl Into<String>) -> Self {
        self.add_order(column, SortDirection::Asc)
    }

    pub fn add_desc_order(self, column: impl Into<String>) -> Self {
        self.add_order(column, SortDirection::Desc)
    }

    pub fn has_order(&self) -> bool {
        !self.orders.is_empty()
    }

    pub fn with_pagination(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn has_pagination(&self) -> bool {
        self.page > 0 && self.page_size > 0
    }

    /// Row offset of the requested page, when paginated.
    pub fn offset(&self) -> Option<u64> {
        self.has_pagination()
            .then(|| u64::from(self.page - 1) * u64::from(self.page_size))
    }

    /// Force the primary connection even for reads.
    pub fn with_master(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse() {
        assert_eq!("".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("not  in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("IS NOT".parse::<Operator>().unwrap(), Operator::IsNot);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Neq);
        assert!("BETWEEN".parse::<Operator>().is_err());
    }

    #[test]
    fn test_operator_default_is_eq() {
        assert_eq!(Operator::default(), Operator::Eq);
    }

    #[test]
    fn test_conditions_preserve_order() {
        let conditions = Conditions::single_eq("a", 1)
            .and("b", Operator::Gt, 2)
            .and("c", Operator::In, vec![3, 4]);
        let columns: Vec<&str> = conditions.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(columns, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_fields_are_unique() {
        let options = QueryOptions::new()
            .with_fields(["id", "name", "id"])
            .add_field("name");
        assert_eq!(options.fields, vec!["id", "name"]);
    }

    #[test]
    fn test_pagination() {
        let options = QueryOptions::new().with_pagination(3, 20);
        assert!(options.has_pagination());
        assert_eq!(options.offset(), Some(40));

        assert_eq!(QueryOptions::new().with_pagination(0, 20).offset(), None);
        assert_eq!(QueryOptions::new().with_pagination(2, 0).offset(), None);
    }

    #[test]
    fn test_orders() {
        let options = QueryOptions::new().add_desc_order("created_at").add_asc_order("id");
        assert!(options.has_order());
        assert_eq!(options.orders[0], Order::desc("created_at"));
        assert_eq!(options.orders[1].direction, SortDirection::Asc);
    }
}

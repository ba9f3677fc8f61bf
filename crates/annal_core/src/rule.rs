use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RuleKind {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    Between,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
    AscOrder,
    DescOrder,
}

impl RuleKind {
    pub fn is_order(self) -> bool {
        matches!(self, RuleKind::AscOrder | RuleKind::DescOrder)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Connector::And => " and ",
            Connector::Or => " or ",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub kind: RuleKind,
    pub property: String,
    pub values: Vec<Value>,
    pub connector: Connector,
}

impl Rule {
    pub fn new(
        kind: RuleKind,
        connector: Connector,
        property: impl Into<String>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            kind,
            property: property.into(),
            values,
            connector,
        }
    }
}

/// Ordered predicates and ordering directives; order decides both clause
/// order and placeholder order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn push(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn and(self, kind: RuleKind, property: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(Rule::new(kind, Connector::And, property, values))
    }

    pub fn or(self, kind: RuleKind, property: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(Rule::new(kind, Connector::Or, property, values))
    }

    pub fn and_eq(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(RuleKind::Eq, property, vec![value.into()])
    }

    pub fn or_eq(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.or(RuleKind::Eq, property, vec![value.into()])
    }

    pub fn and_not_eq(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(RuleKind::NotEq, property, vec![value.into()])
    }

    pub fn and_gt(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(RuleKind::Gt, property, vec![value.into()])
    }

    pub fn and_ge(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(RuleKind::Ge, property, vec![value.into()])
    }

    pub fn and_lt(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(RuleKind::Lt, property, vec![value.into()])
    }

    pub fn and_le(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(RuleKind::Le, property, vec![value.into()])
    }

    pub fn and_like(self, property: impl Into<String>, pattern: impl Into<Value>) -> Self {
        self.and(RuleKind::Like, property, vec![pattern.into()])
    }

    pub fn or_like(self, property: impl Into<String>, pattern: impl Into<Value>) -> Self {
        self.or(RuleKind::Like, property, vec![pattern.into()])
    }

    pub fn and_between(
        self,
        property: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.and(RuleKind::Between, property, vec![low.into(), high.into()])
    }

    pub fn and_in<V: Into<Value>>(
        self,
        property: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.and(RuleKind::In, property, values)
    }

    pub fn and_not_in<V: Into<Value>>(
        self,
        property: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.and(RuleKind::NotIn, property, values)
    }

    pub fn and_is_null(self, property: impl Into<String>) -> Self {
        self.and(RuleKind::IsNull, property, Vec::new())
    }

    pub fn and_is_not_null(self, property: impl Into<String>) -> Self {
        self.and(RuleKind::IsNotNull, property, Vec::new())
    }

    pub fn and_is_empty(self, property: impl Into<String>) -> Self {
        self.and(RuleKind::IsEmpty, property, Vec::new())
    }

    pub fn and_is_not_empty(self, property: impl Into<String>) -> Self {
        self.and(RuleKind::IsNotEmpty, property, Vec::new())
    }

    pub fn asc(self, property: impl Into<String>) -> Self {
        self.and(RuleKind::AscOrder, property, Vec::new())
    }

    pub fn desc(self, property: impl Into<String>) -> Self {
        self.and(RuleKind::DescOrder, property, Vec::new())
    }

    /// Rewrites every property name, e.g. from record property to column.
    pub fn map_properties(&self, mut rename: impl FnMut(&str) -> String) -> Self {
        Self {
            rules: self
                .rules
                .iter()
                .map(|rule| Rule {
                    property: rename(&rule.property),
                    ..rule.clone()
                })
                .collect(),
        }
    }
}

//! Compiles a [`RuleSet`] into a WHERE fragment, an ORDER BY fragment and the
//! positional values for the WHERE placeholders.

use std::collections::BTreeMap;

use crate::{AnnalError, AnnalResult, Connector, Rule, RuleKind, RuleSet, Value};

/// Values for `:name` placeholders.
pub type NamedParams = BTreeMap<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledRules {
    pub where_sql: String,
    pub order_sql: String,
    pub values: Vec<Value>,
}

impl CompiledRules {
    /// `" where ..."`, or empty when there are no predicates.
    pub fn where_clause(&self) -> String {
        if self.where_sql.is_empty() {
            String::new()
        } else {
            format!(" where {}", self.where_sql)
        }
    }

    /// `" order by ..."`, or empty when there are no order terms.
    pub fn order_clause(&self) -> String {
        if self.order_sql.is_empty() {
            String::new()
        } else {
            format!(" order by {}", self.order_sql)
        }
    }
}

struct Predicate {
    connector: Connector,
    sql: String,
    values: Vec<Value>,
}

#[derive(Default)]
struct Clauses {
    predicates: Vec<Predicate>,
    orders: Vec<String>,
}

impl Clauses {
    fn predicate(&mut self, rule: &Rule, sql: String, values: Vec<Value>) {
        self.predicates.push(Predicate {
            connector: rule.connector,
            sql,
            values,
        });
    }

    fn finish(self) -> CompiledRules {
        let mut where_sql = String::new();
        let mut values = Vec::new();
        for (index, predicate) in self.predicates.into_iter().enumerate() {
            if index > 0 {
                where_sql.push_str(predicate.connector.as_sql());
            }
            where_sql.push_str(&predicate.sql);
            values.extend(predicate.values);
        }
        CompiledRules {
            where_sql,
            order_sql: self.orders.join(", "),
            values,
        }
    }
}

pub fn compile(rules: &RuleSet) -> AnnalResult<CompiledRules> {
    let mut clauses = Clauses::default();
    for rule in rules.rules() {
        if rule.kind.is_order() {
            if rule.property.trim().is_empty() {
                continue;
            }
            let property = identifier(&rule.property)?;
            let direction = if rule.kind == RuleKind::AscOrder {
                "asc"
            } else {
                "desc"
            };
            clauses.orders.push(format!("{property} {direction}"));
            continue;
        }
        let property = identifier(&rule.property)?;
        match rule.kind {
            RuleKind::Eq => compare(&mut clauses, rule, property, "="),
            RuleKind::NotEq => compare(&mut clauses, rule, property, "<>"),
            RuleKind::Gt => compare(&mut clauses, rule, property, ">"),
            RuleKind::Ge => compare(&mut clauses, rule, property, ">="),
            RuleKind::Lt => compare(&mut clauses, rule, property, "<"),
            RuleKind::Le => compare(&mut clauses, rule, property, "<="),
            RuleKind::Like => like(&mut clauses, rule, property)?,
            RuleKind::Between => {
                if let [low, high] = rule.values.as_slice()
                    && !low.is_null()
                    && !high.is_null()
                {
                    clauses.predicate(
                        rule,
                        format!("{property} between ? and ?"),
                        vec![low.clone(), high.clone()],
                    );
                }
            }
            RuleKind::In => membership(&mut clauses, rule, property, "in"),
            RuleKind::NotIn => membership(&mut clauses, rule, property, "not in"),
            RuleKind::IsNull => clauses.predicate(rule, format!("{property} is null"), Vec::new()),
            RuleKind::IsNotNull => {
                clauses.predicate(rule, format!("{property} is not null"), Vec::new())
            }
            RuleKind::IsEmpty => clauses.predicate(rule, format!("{property} = ''"), Vec::new()),
            RuleKind::IsNotEmpty => {
                clauses.predicate(rule, format!("{property} <> ''"), Vec::new())
            }
            RuleKind::AscOrder | RuleKind::DescOrder => {}
        }
    }
    Ok(clauses.finish())
}

fn first_value(rule: &Rule) -> Option<&Value> {
    rule.values.first().filter(|value| !value.is_null())
}

fn compare(clauses: &mut Clauses, rule: &Rule, property: &str, op: &str) {
    if let Some(value) = first_value(rule) {
        clauses.predicate(rule, format!("{property} {op} ?"), vec![value.clone()]);
    }
}

/// `*` acts as a wildcard; the pattern is always wrapped in `%...%`.
fn like(clauses: &mut Clauses, rule: &Rule, property: &str) -> AnnalResult<()> {
    let Some(value) = first_value(rule) else {
        return Ok(());
    };
    let raw = match value {
        Value::Str(text) => text.clone(),
        Value::I32(number) => number.to_string(),
        Value::I64(number) => number.to_string(),
        Value::F64(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => {
            return Err(AnnalError::validation(format!(
                "like pattern for {property} must be scalar, got {other:?}"
            )));
        }
    };
    let pattern = format!("%{}%", raw.replace('*', "%"));
    clauses.predicate(rule, format!("{property} like ?"), vec![Value::Str(pattern)]);
    Ok(())
}

fn membership(clauses: &mut Clauses, rule: &Rule, property: &str, op: &str) {
    let items: Vec<Value> = match rule.values.as_slice() {
        [Value::List(nested)] => nested.clone(),
        flat => flat.to_vec(),
    };
    if items.is_empty() {
        return;
    }
    let placeholders = vec!["?"; items.len()].join(",");
    clauses.predicate(rule, format!("{property} {op} ({placeholders})"), items);
}

/// Rewrites `:name` placeholders to `?` and returns the values in placeholder
/// order. A `List` value expands to one placeholder per item. Quoted text and
/// `::` casts are left alone.
pub fn expand_named(sql: &str, params: &NamedParams) -> AnnalResult<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                out.push(ch);
            }
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                out.push_str("::");
            }
            ':' if chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') =>
            {
                let mut name = String::new();
                while let Some(next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' {
                        name.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = params.get(&name).ok_or_else(|| {
                    AnnalError::validation(format!("no value for parameter :{name}"))
                })?;
                match value {
                    Value::List(items) if items.is_empty() => {
                        return Err(AnnalError::validation(format!(
                            "parameter :{name} is an empty list"
                        )));
                    }
                    Value::List(items) => {
                        out.push_str(&vec!["?"; items.len()].join(","));
                        values.extend(items.iter().cloned());
                    }
                    other => {
                        out.push('?');
                        values.push(other.clone());
                    }
                }
            }
            _ => out.push(ch),
        }
    }
    Ok((out, values))
}

fn identifier(name: &str) -> AnnalResult<&str> {
    let name = name.trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
    if valid {
        Ok(name)
    } else {
        Err(AnnalError::validation(format!(
            "'{name}' is not a valid column reference"
        )))
    }
}

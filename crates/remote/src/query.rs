//! Query descriptors for row reads against the hosted data service.
//!
//! A [`Query`] names a table, the columns to return, embedded relations,
//! filters, ordering and an optional limit. The same descriptor is rendered to
//! REST query parameters by the HTTP client and evaluated directly by the
//! in-memory service.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// A single row as returned by the service.
pub type Row = Map<String, Value>;

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Column equals the value.
    Eq,
    /// Case-insensitive pattern match with `%` and `_` wildcards.
    ILike,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::ILike,
            value: Value::String(pattern.into()),
        }
    }

    /// Evaluate the filter against a row.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::ILike => match (actual, &self.value) {
                (Value::String(text), Value::String(pattern)) => {
                    like_match(&text.to_lowercase(), &pattern.to_lowercase())
                }
                _ => false,
            },
        }
    }

    /// Render as a `column=op.value` REST parameter.
    pub fn to_param(&self) -> (String, String) {
        let rendered = match (&self.op, &self.value) {
            (FilterOp::Eq, Value::Null) => "is.null".to_string(),
            (FilterOp::Eq, value) => format!("eq.{}", scalar_text(value)),
            (FilterOp::ILike, value) => format!("ilike.{}", scalar_text(value)),
        };
        (self.column.clone(), rendered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Related rows fetched together with each result row.
///
/// The relation resolves `row[foreign_key] == related.id` and nests the related
/// row (restricted to `columns`) under `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub alias: String,
    pub table: String,
    pub foreign_key: String,
    pub columns: Vec<String>,
}

impl Embed {
    pub fn new(
        alias: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            table: table.into(),
            foreign_key: foreign_key.into(),
            columns: Vec::new(),
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    fn select_fragment(&self) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        };
        format!("{}:{}({})", self.alias, self.table, columns)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Vec<String>,
    pub embeds: Vec<Embed>,
    pub filters: Vec<Filter>,
    /// Sort keys in precedence order.
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            embeds: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn ilike(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filters.push(Filter::ilike(column, pattern));
        self
    }

    /// Add a sort key. Later keys break ties left by earlier ones.
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when every filter accepts the row.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }

    /// The `select=` parameter including embedded relations.
    pub fn select_clause(&self) -> String {
        let mut parts: Vec<String> = if self.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            self.columns.clone()
        };
        parts.extend(self.embeds.iter().map(Embed::select_fragment));
        parts.join(",")
    }

    /// Render the descriptor as REST query parameters.
    ///
    /// ```
    /// use coopmarket_remote::Query;
    ///
    /// let query = Query::table("members")
    ///     .eq("cooperative_id", "c-1")
    ///     .order_by("created_at", false);
    /// let params = query.to_params();
    /// assert!(params.contains(&("cooperative_id".to_string(), "eq.c-1".to_string())));
    /// assert!(params.contains(&("order".to_string(), "created_at.desc".to_string())));
    /// ```
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.select_clause())];
        params.extend(self.filters.iter().map(Filter::to_param));
        if !self.order.is_empty() {
            let keys: Vec<String> = self
                .order
                .iter()
                .map(|order| {
                    let direction = if order.ascending { "asc" } else { "desc" };
                    format!("{}.{}", order.column, direction)
                })
                .collect();
            params.push(("order".to_string(), keys.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Keep only the selected columns of a row; embeds are attached separately.
    pub fn project(&self, row: &Row) -> Row {
        if self.columns.is_empty() || self.columns.iter().any(|c| c == "*") {
            return row.clone();
        }
        self.columns
            .iter()
            .map(|column| {
                (
                    column.clone(),
                    row.get(column).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    /// Sort rows by the query's keys. Rows equal on every key keep their
    /// existing order.
    pub fn sort(&self, rows: &mut [Row]) {
        if self.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            self.order
                .iter()
                .map(|order| {
                    let left = a.get(&order.column).unwrap_or(&Value::Null);
                    let right = b.get(&order.column).unwrap_or(&Value::Null);
                    let ordering = compare_values(left, right);
                    if order.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.parse::<f64>().ok() == b.as_f64()
        }
        _ => left == right,
    }
}

/// Total order over JSON scalars: nulls first, then booleans, numbers, strings.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&b.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// SQL `LIKE` matching over chars: `%` is any run, `_` is any single char.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_ilike_matching() {
        assert!(like_match("gold ore", "%old%"));
        assert!(like_match("gold", "g_ld"));
        assert!(like_match("gold", "%"));
        assert!(!like_match("silver", "%gold%"));
        assert!(!like_match("gold", "gol"));

        let filter = Filter::ilike("mineral_type", "%GOLD%");
        assert!(filter.matches(&row(json!({"mineral_type": "Alluvial gold"}))));
        assert!(!filter.matches(&row(json!({"mineral_type": null}))));
    }

    #[test]
    fn test_eq_compares_numbers_loosely() {
        let filter = Filter::eq("quantity", 10);
        assert!(filter.matches(&row(json!({"quantity": 10.0}))));
        assert!(!filter.matches(&row(json!({"quantity": 11}))));
    }

    #[test]
    fn test_select_clause_with_embeds() {
        let query = Query::table("mineral_submissions")
            .columns(&["id", "quantity"])
            .embed(Embed::new("member", "members", "member_id").columns(&["full_name"]));
        assert_eq!(query.select_clause(), "id,quantity,member:members(full_name)");
    }

    #[test]
    fn test_params_render_filters_order_and_limit() {
        let query = Query::table("mineral_listings")
            .eq("status", "available")
            .ilike("mineral_type", "%gold%")
            .eq("notes", Value::Null)
            .order_by("price_per_unit", true)
            .limit(5);

        let params = query.to_params();
        assert_eq!(params[0], ("select".to_string(), "*".to_string()));
        assert!(params.contains(&("status".to_string(), "eq.available".to_string())));
        assert!(params.contains(&("mineral_type".to_string(), "ilike.%gold%".to_string())));
        assert!(params.contains(&("notes".to_string(), "is.null".to_string())));
        assert!(params.contains(&("order".to_string(), "price_per_unit.asc".to_string())));
        assert!(params.contains(&("limit".to_string(), "5".to_string())));
    }

    #[test]
    fn test_sort_descending_keeps_ties_stable() {
        let query = Query::table("t").order_by("rank", false);
        let mut rows = vec![
            row(json!({"id": "a", "rank": 1})),
            row(json!({"id": "b", "rank": 2})),
            row(json!({"id": "c", "rank": 2})),
        ];
        query.sort(&mut rows);
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap_or("")).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_secondary_key_breaks_ties() {
        let query = Query::table("t")
            .order_by("price", true)
            .order_by("id", true);
        assert!(query
            .to_params()
            .contains(&("order".to_string(), "price.asc,id.asc".to_string())));

        let mut rows = vec![
            row(json!({"id": "c", "price": 5})),
            row(json!({"id": "b", "price": 5})),
            row(json!({"id": "a", "price": 9})),
        ];
        query.sort(&mut rows);
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap_or("")).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_project_selected_columns() {
        let query = Query::table("t").columns(&["id", "missing"]);
        let projected = query.project(&row(json!({"id": "x", "other": 1})));
        assert_eq!(Value::Object(projected), json!({"id": "x", "missing": null}));
    }
}

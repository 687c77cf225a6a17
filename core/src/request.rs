//! `QueryRequest` recognized options parsed into typed structs at the API
//! boundary — the narrow coercion layer between raw JSON and the rest of
//! the compiler.

use compact_str::CompactString;

use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    FindMany,
    FindFirst,
    FindUnique,
    Count,
    Aggregate,
    GroupBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone)]
pub struct OrderKey {
    pub field: CompactString,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

/// `take`/`skip` accept either a literal non-negative integer or a dynamic
/// marker; `count` additionally forbids a positive static `skip`.
#[derive(Debug, Clone)]
pub enum IntArg {
    Static(i64),
    Dynamic(CompactString),
}

#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub take: Option<IntArg>,
    pub skip: Option<IntArg>,
    pub cursor: Option<serde_json::Value>,
}

/// The recognized top-level keys of a `QueryRequest`. Unknown keys fail
/// with `UnknownOption` before any compilation begins.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub where_: Option<serde_json::Value>,
    pub select: Option<serde_json::Value>,
    pub include: Option<serde_json::Value>,
    pub order_by: Vec<OrderKey>,
    pub pagination: Pagination,
    pub distinct: Vec<CompactString>,
    pub by: Vec<CompactString>,
    pub having: Option<serde_json::Value>,
    pub count: Option<serde_json::Value>,
    pub sum: Option<serde_json::Value>,
    pub avg: Option<serde_json::Value>,
    pub min: Option<serde_json::Value>,
    pub max: Option<serde_json::Value>,
}

const RECOGNIZED_KEYS: &[&str] = &[
    "where", "select", "include", "orderBy", "take", "skip", "cursor", "distinct", "by", "having",
    "_count", "_sum", "_avg", "_min", "_max",
];

/// Parses a raw JSON object of request options into a [`QueryRequest`],
/// rejecting any key outside the recognized set.
pub fn parse_request(raw: &serde_json::Value) -> Result<QueryRequest, CompileError> {
    let serde_json::Value::Object(obj) = raw else {
        return Err(CompileError::invalid_argument("query request must be an object", ""));
    };

    for key in obj.keys() {
        if !RECOGNIZED_KEYS.contains(&key.as_str()) {
            return Err(CompileError::invalid_option(key.as_str(), ""));
        }
    }

    let mut request = QueryRequest::default();
    request.where_ = obj.get("where").cloned();
    request.select = obj.get("select").cloned();
    request.include = obj.get("include").cloned();
    request.having = obj.get("having").cloned();
    request.count = obj.get("_count").cloned();
    request.sum = obj.get("_sum").cloned();
    request.avg = obj.get("_avg").cloned();
    request.min = obj.get("_min").cloned();
    request.max = obj.get("_max").cloned();

    if let Some(raw_order) = obj.get("orderBy") {
        request.order_by = parse_order_by(raw_order)?;
    }
    if let Some(raw_take) = obj.get("take") {
        request.pagination.take = Some(parse_int_arg(raw_take, "take")?);
    }
    if let Some(raw_skip) = obj.get("skip") {
        request.pagination.skip = Some(parse_int_arg(raw_skip, "skip")?);
    }
    request.pagination.cursor = obj.get("cursor").cloned();

    if let Some(serde_json::Value::Array(items)) = obj.get("distinct") {
        for item in items {
            if let serde_json::Value::String(s) = item {
                request.distinct.push(CompactString::from(s.as_str()));
            } else {
                return Err(CompileError::invalid_argument("distinct expects a list of field names", "distinct"));
            }
        }
    }
    if let Some(serde_json::Value::Array(items)) = obj.get("by") {
        let mut seen = std::collections::HashSet::new();
        for item in items {
            let serde_json::Value::String(s) = item else {
                return Err(CompileError::invalid_argument("by expects a list of field names", "by"));
            };
            if !seen.insert(s.clone()) {
                return Err(CompileError::invalid_argument(format!("duplicate groupBy field `{s}`"), "by"));
            }
            request.by.push(CompactString::from(s.as_str()));
        }
    }

    Ok(request)
}

fn parse_order_by(raw: &serde_json::Value) -> Result<Vec<OrderKey>, CompileError> {
    let items: Vec<&serde_json::Value> = match raw {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(_) => vec![raw],
        _ => return Err(CompileError::invalid_argument("orderBy must be an object or list", "orderBy")),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let serde_json::Value::Object(obj) = item else {
            return Err(CompileError::invalid_argument("orderBy entry must be an object", "orderBy"));
        };
        for (field, dir_raw) in obj {
            if field == "nulls" {
                continue;
            }
            let direction = match dir_raw {
                serde_json::Value::String(s) if s == "asc" => SortDirection::Asc,
                serde_json::Value::String(s) if s == "desc" => SortDirection::Desc,
                _ => return Err(CompileError::invalid_argument("orderBy direction must be asc/desc", "orderBy")),
            };
            let nulls = match obj.get("nulls") {
                Some(serde_json::Value::String(s)) if s == "first" => Some(NullsOrder::First),
                Some(serde_json::Value::String(s)) if s == "last" => Some(NullsOrder::Last),
                _ => None,
            };
            out.push(OrderKey {
                field: CompactString::from(field.as_str()),
                direction,
                nulls,
            });
        }
    }
    Ok(out)
}

fn parse_int_arg(raw: &serde_json::Value, name: &str) -> Result<IntArg, CompileError> {
    match raw {
        serde_json::Value::Number(n) => {
            let i = n
                .as_i64()
                .ok_or_else(|| CompileError::invalid_argument(format!("{name} must be a finite integer"), name))?;
            if i < 0 {
                return Err(CompileError::invalid_argument(format!("{name} must be non-negative"), name));
            }
            Ok(IntArg::Static(i))
        }
        serde_json::Value::Object(obj) => {
            if let Some(serde_json::Value::String(dyn_name)) = obj.get("$dynamic") {
                Ok(IntArg::Dynamic(CompactString::from(dyn_name.as_str())))
            } else {
                Err(CompileError::invalid_argument(format!("{name} must be an integer or dynamic marker"), name))
            }
        }
        _ => Err(CompileError::invalid_argument(format!("{name} must be an integer or dynamic marker"), name)),
    }
}

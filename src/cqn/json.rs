//! CQN JSON (de)serialization.
//!
//! The JSON shapes follow the established CQN notation:
//!
//! ```json
//! { "SELECT": { "from": { "ref": ["Books"] },
//!               "columns": [ { "ref": ["title"] }, { "ref": ["author"], "expand": ["*"] } ],
//!               "where": [ { "ref": ["ID"] }, "=", { "val": 1 } ] } }
//! ```
//!
//! Parsing goes through `Raw*` mirror types with serde derives and is then
//! converted into the typed tree. Resolution links are never serialized.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use super::{
    Column, ColumnKind, Delete, Expr, Insert, Join, JoinKind, Limit, Nested, Nulls, OrderBy,
    Query, Ref, Select, Source, Step, Update,
};

/// Errors raised while reading CQN JSON.
#[derive(Debug, Error)]
pub enum CqnJsonError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid query shape: {0}")]
    Shape(String),
}

type JsonResult<T> = Result<T, CqnJsonError>;

fn shape(message: impl Into<String>) -> CqnJsonError {
    CqnJsonError::Shape(message.into())
}

// ============================================================================
// Raw mirror types
// ============================================================================

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Decorations {
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cast: Option<RawCast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nulls: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCast {
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawExpr {
    Keyword(String),
    Expand {
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        path: Option<Vec<RawStep>>,
        expand: Vec<RawExpr>,
        #[serde(rename = "orderBy", default, skip_serializing_if = "Vec::is_empty")]
        order_by: Vec<RawExpr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<Box<RawLimit>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        excluding: Vec<String>,
        #[serde(flatten)]
        deco: Decorations,
    },
    Inline {
        #[serde(rename = "ref")]
        path: Vec<RawStep>,
        inline: Vec<RawExpr>,
        #[serde(flatten)]
        deco: Decorations,
    },
    Ref {
        #[serde(rename = "ref")]
        path: Vec<RawStep>,
        #[serde(default, skip_serializing_if = "is_false")]
        param: bool,
        #[serde(flatten)]
        deco: Decorations,
    },
    Val {
        val: Value,
        #[serde(flatten)]
        deco: Decorations,
    },
    Func {
        func: String,
        #[serde(default)]
        args: Vec<RawExpr>,
        #[serde(flatten)]
        deco: Decorations,
    },
    Xpr {
        xpr: Vec<RawExpr>,
        #[serde(flatten)]
        deco: Decorations,
    },
    List {
        list: Vec<RawExpr>,
        #[serde(flatten)]
        deco: Decorations,
    },
    Select {
        #[serde(rename = "SELECT")]
        select: Box<RawSelect>,
        #[serde(flatten)]
        deco: Decorations,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Id(String),
    Step {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<IndexMap<String, RawExpr>>,
        #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<RawExpr>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawLimit {
    rows: RawExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<RawExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSource {
    Join {
        join: String,
        args: Vec<RawSource>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        on: Vec<RawExpr>,
    },
    Select {
        #[serde(rename = "SELECT")]
        select: Box<RawSelect>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    Ref {
        #[serde(rename = "ref")]
        path: Vec<RawStep>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSelect {
    from: RawSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    columns: Vec<RawExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    excluding: Vec<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    where_clause: Vec<RawExpr>,
    #[serde(rename = "groupBy", default, skip_serializing_if = "Vec::is_empty")]
    group_by: Vec<RawExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    having: Vec<RawExpr>,
    #[serde(rename = "orderBy", default, skip_serializing_if = "Vec::is_empty")]
    order_by: Vec<RawExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<RawLimit>,
    #[serde(default, skip_serializing_if = "is_false")]
    distinct: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    one: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    expand: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    localized: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    search: Vec<RawExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Name(String),
    Ref {
        #[serde(rename = "ref")]
        path: Vec<RawStep>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSubquery {
    #[serde(rename = "SELECT")]
    select: RawSelect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInsert {
    into: RawTarget,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    entries: Vec<serde_json::Map<String, Value>>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    as_select: Option<RawSubquery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawUpdate {
    entity: RawTarget,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    data: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    with: IndexMap<String, RawExpr>,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    where_clause: Vec<RawExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDelete {
    from: RawTarget,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    where_clause: Vec<RawExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum RawQuery {
    #[serde(rename = "SELECT")]
    Select(RawSelect),
    #[serde(rename = "INSERT")]
    Insert(RawInsert),
    #[serde(rename = "UPSERT")]
    Upsert(RawInsert),
    #[serde(rename = "UPDATE")]
    Update(RawUpdate),
    #[serde(rename = "DELETE")]
    Delete(RawDelete),
}

// ============================================================================
// Raw -> typed
// ============================================================================

fn step_from_raw(raw: RawStep) -> JsonResult<Step> {
    match raw {
        RawStep::Id(id) => Ok(Step::new(id)),
        RawStep::Step { id, args, filter } => Ok(Step {
            id,
            args: args
                .unwrap_or_default()
                .into_iter()
                .map(|(name, value)| Ok((name, expr_from_raw(value)?)))
                .collect::<JsonResult<_>>()?,
            filter: tokens_from_raw(filter)?,
        }),
    }
}

fn ref_from_raw(path: Vec<RawStep>) -> JsonResult<Ref> {
    if path.is_empty() {
        return Err(shape("empty ref"));
    }
    Ok(Ref {
        steps: path.into_iter().map(step_from_raw).collect::<JsonResult<_>>()?,
        links: Vec::new(),
    })
}

fn tokens_from_raw(raw: Vec<RawExpr>) -> JsonResult<Vec<Expr>> {
    raw.into_iter().map(expr_from_raw).collect()
}

fn expr_from_raw(raw: RawExpr) -> JsonResult<Expr> {
    Ok(match raw {
        RawExpr::Keyword(keyword) => Expr::Keyword(keyword),
        RawExpr::Ref {
            path, param: true, ..
        } => {
            let r = ref_from_raw(path)?;
            let name = r.first_id().trim_start_matches(':').to_string();
            Expr::Param(name)
        }
        RawExpr::Ref { path, .. } => Expr::Ref(ref_from_raw(path)?),
        RawExpr::Val { val, .. } => Expr::Val(val),
        RawExpr::Func { func, args, .. } => Expr::Func {
            name: func,
            args: tokens_from_raw(args)?,
        },
        RawExpr::Xpr { xpr, .. } => Expr::Xpr(tokens_from_raw(xpr)?),
        RawExpr::List { list, .. } => Expr::List(tokens_from_raw(list)?),
        RawExpr::Select { select, .. } => Expr::Query(Box::new(select_from_raw(*select)?)),
        RawExpr::Expand { .. } | RawExpr::Inline { .. } => {
            return Err(shape("expand and inline are only allowed in columns"))
        }
    })
}

fn decorations(raw: &RawExpr) -> Option<&Decorations> {
    match raw {
        RawExpr::Keyword(_) => None,
        RawExpr::Expand { deco, .. }
        | RawExpr::Inline { deco, .. }
        | RawExpr::Ref { deco, .. }
        | RawExpr::Val { deco, .. }
        | RawExpr::Func { deco, .. }
        | RawExpr::Xpr { deco, .. }
        | RawExpr::List { deco, .. }
        | RawExpr::Select { deco, .. } => Some(deco),
    }
}

fn column_from_raw(raw: RawExpr) -> JsonResult<Column> {
    let deco = decorations(&raw).cloned().unwrap_or_default();
    let kind = match raw {
        RawExpr::Keyword(k) if k == "*" => ColumnKind::Wildcard,
        RawExpr::Keyword(k) => return Err(shape(format!("unexpected column \"{}\"", k))),
        RawExpr::Expand {
            path,
            expand,
            order_by,
            limit,
            excluding,
            ..
        } => ColumnKind::Expand(Nested {
            path: path.map(ref_from_raw).transpose()?,
            columns: columns_from_raw(expand)?,
            order_by: order_by_from_raw(order_by)?,
            limit: limit.map(|l| limit_from_raw(*l)).transpose()?,
            excluding,
        }),
        RawExpr::Inline { path, inline, .. } => ColumnKind::Inline(Nested::new(
            Some(ref_from_raw(path)?),
            columns_from_raw(inline)?,
        )),
        other => ColumnKind::Expr(expr_from_raw(other)?),
    };
    Ok(Column {
        kind,
        alias: deco.alias,
        cast: deco.cast.map(|c| c.type_name),
        element: None,
    })
}

fn columns_from_raw(raw: Vec<RawExpr>) -> JsonResult<Vec<Column>> {
    raw.into_iter().map(column_from_raw).collect()
}

fn order_by_from_raw(raw: Vec<RawExpr>) -> JsonResult<Vec<OrderBy>> {
    raw.into_iter()
        .map(|item| {
            let deco = decorations(&item).cloned().unwrap_or_default();
            let nulls = match deco.nulls.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("first") => Some(Nulls::First),
                Some("last") => Some(Nulls::Last),
                None => None,
                Some(other) => return Err(shape(format!("invalid nulls \"{}\"", other))),
            };
            Ok(OrderBy {
                expr: expr_from_raw(item)?,
                descending: deco
                    .sort
                    .is_some_and(|s| s.eq_ignore_ascii_case("desc")),
                nulls,
            })
        })
        .collect()
}

fn limit_from_raw(raw: RawLimit) -> JsonResult<Limit> {
    Ok(Limit {
        rows: expr_from_raw(raw.rows)?,
        offset: raw.offset.map(expr_from_raw).transpose()?,
    })
}

fn source_from_raw(raw: RawSource) -> JsonResult<Source> {
    match raw {
        RawSource::Ref { path, alias } => Ok(Source::Ref {
            path: ref_from_raw(path)?,
            alias,
        }),
        RawSource::Select { select, alias } => Ok(Source::Select {
            query: Box::new(select_from_raw(*select)?),
            alias,
        }),
        RawSource::Join { join, args, on } => {
            let kind = JoinKind::parse(&join)
                .ok_or_else(|| shape(format!("unknown join kind \"{}\"", join)))?;
            let mut args = args.into_iter().map(source_from_raw);
            let mut left = args
                .next()
                .ok_or_else(|| shape("join without arguments"))??;
            let rest: Vec<Source> = args.collect::<JsonResult<_>>()?;
            if rest.is_empty() {
                return Err(shape("join needs at least two arguments"));
            }
            let last = rest.len() - 1;
            // n-ary joins fold to the left; the condition belongs to the last one
            for (i, right) in rest.into_iter().enumerate() {
                left = Source::Join(Box::new(Join {
                    kind,
                    left,
                    right,
                    on: if i == last {
                        tokens_from_raw(on.clone())?
                    } else {
                        Vec::new()
                    },
                }));
            }
            Ok(left)
        }
    }
}

fn select_from_raw(raw: RawSelect) -> JsonResult<Select> {
    Ok(Select {
        from: source_from_raw(raw.from)?,
        columns: columns_from_raw(raw.columns)?,
        excluding: raw.excluding,
        where_clause: tokens_from_raw(raw.where_clause)?,
        group_by: tokens_from_raw(raw.group_by)?,
        having: tokens_from_raw(raw.having)?,
        order_by: order_by_from_raw(raw.order_by)?,
        limit: raw.limit.map(limit_from_raw).transpose()?,
        distinct: raw.distinct,
        one: raw.one,
        expand: raw.expand,
        localized: raw.localized,
        search: tokens_from_raw(raw.search)?,
    })
}

fn target_from_raw(raw: RawTarget) -> JsonResult<(Ref, Option<String>)> {
    match raw {
        RawTarget::Name(name) => Ok((Ref::new([name]), None)),
        RawTarget::Ref { path, alias } => Ok((ref_from_raw(path)?, alias)),
    }
}

fn insert_from_raw(raw: RawInsert) -> JsonResult<Insert> {
    let (into, _) = target_from_raw(raw.into)?;
    Ok(Insert {
        into,
        columns: raw.columns,
        values: raw.values,
        rows: raw.rows,
        entries: raw.entries,
        as_select: raw
            .as_select
            .map(|s| select_from_raw(s.select).map(Box::new))
            .transpose()?,
    })
}

fn query_from_raw(raw: RawQuery) -> JsonResult<Query> {
    Ok(match raw {
        RawQuery::Select(select) => Query::Select(select_from_raw(select)?),
        RawQuery::Insert(insert) => Query::Insert(insert_from_raw(insert)?),
        RawQuery::Upsert(insert) => Query::Upsert(insert_from_raw(insert)?),
        RawQuery::Update(update) => {
            let (entity, alias) = target_from_raw(update.entity)?;
            Query::Update(Update {
                entity,
                alias,
                data: update.data,
                with: update
                    .with
                    .into_iter()
                    .map(|(name, value)| Ok((name, expr_from_raw(value)?)))
                    .collect::<JsonResult<_>>()?,
                where_clause: tokens_from_raw(update.where_clause)?,
            })
        }
        RawQuery::Delete(delete) => {
            let (from, alias) = target_from_raw(delete.from)?;
            Query::Delete(Delete {
                from,
                alias,
                where_clause: tokens_from_raw(delete.where_clause)?,
            })
        }
    })
}

// ============================================================================
// Typed -> raw
// ============================================================================

fn raw_step(step: &Step) -> RawStep {
    if step.args.is_empty() && step.filter.is_empty() {
        return RawStep::Id(step.id.clone());
    }
    RawStep::Step {
        id: step.id.clone(),
        args: if step.args.is_empty() {
            None
        } else {
            Some(
                step.args
                    .iter()
                    .map(|(name, value)| (name.clone(), raw_expr(value)))
                    .collect(),
            )
        },
        filter: raw_tokens(&step.filter),
    }
}

fn raw_path(r: &Ref) -> Vec<RawStep> {
    r.steps.iter().map(raw_step).collect()
}

fn raw_tokens(tokens: &[Expr]) -> Vec<RawExpr> {
    tokens.iter().map(raw_expr).collect()
}

fn raw_expr(expr: &Expr) -> RawExpr {
    raw_expr_with(expr, Decorations::default())
}

fn raw_expr_with(expr: &Expr, deco: Decorations) -> RawExpr {
    match expr {
        Expr::Keyword(keyword) => RawExpr::Keyword(keyword.clone()),
        Expr::Ref(r) => RawExpr::Ref {
            path: raw_path(r),
            param: false,
            deco,
        },
        Expr::Param(name) => RawExpr::Ref {
            path: vec![RawStep::Id(name.clone())],
            param: true,
            deco,
        },
        Expr::Val(value) => RawExpr::Val {
            val: value.clone(),
            deco,
        },
        Expr::Func { name, args } => RawExpr::Func {
            func: name.clone(),
            args: raw_tokens(args),
            deco,
        },
        Expr::Xpr(tokens) => RawExpr::Xpr {
            xpr: raw_tokens(tokens),
            deco,
        },
        Expr::List(items) => RawExpr::List {
            list: raw_tokens(items),
            deco,
        },
        Expr::Query(select) => RawExpr::Select {
            select: Box::new(raw_select(select)),
            deco,
        },
    }
}

fn raw_column(column: &Column) -> RawExpr {
    let deco = Decorations {
        alias: column.alias.clone(),
        cast: column.cast.clone().map(|type_name| RawCast { type_name }),
        ..Default::default()
    };
    match &column.kind {
        ColumnKind::Wildcard => RawExpr::Keyword("*".to_string()),
        ColumnKind::Expr(expr) => raw_expr_with(expr, deco),
        ColumnKind::Expand(nested) => RawExpr::Expand {
            path: nested.path.as_ref().map(raw_path),
            expand: nested.columns.iter().map(raw_column).collect(),
            order_by: raw_order_by(&nested.order_by),
            limit: nested.limit.as_ref().map(|l| Box::new(raw_limit(l))),
            excluding: nested.excluding.clone(),
            deco,
        },
        ColumnKind::Inline(nested) => RawExpr::Inline {
            path: nested.path.as_ref().map(raw_path).unwrap_or_default(),
            inline: nested.columns.iter().map(raw_column).collect(),
            deco,
        },
    }
}

fn raw_order_by(order_by: &[OrderBy]) -> Vec<RawExpr> {
    order_by
        .iter()
        .map(|item| {
            let deco = Decorations {
                sort: item.descending.then(|| "desc".to_string()),
                nulls: item.nulls.map(|n| match n {
                    Nulls::First => "first".to_string(),
                    Nulls::Last => "last".to_string(),
                }),
                ..Default::default()
            };
            raw_expr_with(&item.expr, deco)
        })
        .collect()
}

fn raw_limit(limit: &Limit) -> RawLimit {
    RawLimit {
        rows: raw_expr(&limit.rows),
        offset: limit.offset.as_ref().map(raw_expr),
    }
}

fn raw_source(source: &Source) -> RawSource {
    match source {
        Source::Ref { path, alias } => RawSource::Ref {
            path: raw_path(path),
            alias: alias.clone(),
        },
        Source::Select { query, alias } => RawSource::Select {
            select: Box::new(raw_select(query)),
            alias: alias.clone(),
        },
        Source::Join(join) => RawSource::Join {
            join: join.kind.as_str().to_string(),
            args: vec![raw_source(&join.left), raw_source(&join.right)],
            on: raw_tokens(&join.on),
        },
    }
}

fn raw_select(select: &Select) -> RawSelect {
    RawSelect {
        from: raw_source(&select.from),
        columns: select.columns.iter().map(raw_column).collect(),
        excluding: select.excluding.clone(),
        where_clause: raw_tokens(&select.where_clause),
        group_by: raw_tokens(&select.group_by),
        having: raw_tokens(&select.having),
        order_by: raw_order_by(&select.order_by),
        limit: select.limit.as_ref().map(raw_limit),
        distinct: select.distinct,
        one: select.one,
        expand: select.expand,
        localized: select.localized,
        search: raw_tokens(&select.search),
    }
}

fn raw_target(path: &Ref, alias: Option<&String>) -> RawTarget {
    RawTarget::Ref {
        path: raw_path(path),
        alias: alias.cloned(),
    }
}

fn raw_insert(insert: &Insert) -> RawInsert {
    RawInsert {
        into: raw_target(&insert.into, None),
        columns: insert.columns.clone(),
        values: insert.values.clone(),
        rows: insert.rows.clone(),
        entries: insert.entries.clone(),
        as_select: insert.as_select.as_ref().map(|s| RawSubquery {
            select: raw_select(s),
        }),
    }
}

fn raw_query(query: &Query) -> RawQuery {
    match query {
        Query::Select(select) => RawQuery::Select(raw_select(select)),
        Query::Insert(insert) => RawQuery::Insert(raw_insert(insert)),
        Query::Upsert(insert) => RawQuery::Upsert(raw_insert(insert)),
        Query::Update(update) => RawQuery::Update(RawUpdate {
            entity: raw_target(&update.entity, update.alias.as_ref()),
            data: update.data.clone(),
            with: update
                .with
                .iter()
                .map(|(name, expr)| (name.clone(), raw_expr(expr)))
                .collect(),
            where_clause: raw_tokens(&update.where_clause),
        }),
        Query::Delete(delete) => RawQuery::Delete(RawDelete {
            from: raw_target(&delete.from, delete.alias.as_ref()),
            where_clause: raw_tokens(&delete.where_clause),
        }),
    }
}

// ============================================================================
// Public API
// ============================================================================

impl Query {
    /// Parse a statement from CQN JSON text.
    pub fn from_json(text: &str) -> Result<Self, CqnJsonError> {
        let raw: RawQuery = serde_json::from_str(text)?;
        query_from_raw(raw)
    }

    /// Parse a statement from a CQN JSON value.
    pub fn from_value(value: Value) -> Result<Self, CqnJsonError> {
        let raw: RawQuery = serde_json::from_value(value)?;
        query_from_raw(raw)
    }

    /// CQN JSON of this statement.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(raw_query(self)).unwrap_or(Value::Null)
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        raw_query(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawQuery::deserialize(deserializer)?;
        query_from_raw(raw).map_err(D::Error::custom)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        raw_expr(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawExpr::deserialize(deserializer)?;
        expr_from_raw(raw).map_err(D::Error::custom)
    }
}

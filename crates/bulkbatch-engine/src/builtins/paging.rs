//! Keyset paging queries per SQL dialect.
//!
//! Every dialect gets two statements: the first page, and the remaining
//! pages, which resume after the sort-key values of the previous page's last
//! row. Those values are bound as named parameters `:_<column>`.

use serde::{Deserialize, Serialize};

use crate::error::{AssemblyError, AssemblyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASCENDING", alias = "ascending", alias = "ASC", alias = "asc")]
    Ascending,
    #[serde(rename = "DESCENDING", alias = "descending", alias = "DESC", alias = "desc")]
    Descending,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }

    fn after(self) -> &'static str {
        match self {
            SortOrder::Ascending => ">",
            SortOrder::Descending => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub key: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortKey {
    pub fn new(key: impl Into<String>, order: SortOrder) -> Self {
        Self {
            key: key.into(),
            order,
        }
    }

    /// Column name without a table alias: `t.id` -> `id`.
    pub fn column(&self) -> &str {
        self.key.rsplit('.').next().unwrap_or(&self.key)
    }

    /// Named parameter carrying the previous page's last value.
    pub fn parameter(&self) -> String {
        format!("_{}", self.column())
    }
}

/// Query parts of a paging reader.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingClause {
    pub select_clause: String,
    pub from_clause: String,
    #[serde(default)]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub group_by_clause: Option<String>,
    #[serde(default)]
    pub sort_clause: Vec<SortKey>,
}

impl PagingClause {
    fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref().map(str::trim).filter(|w| !w.is_empty())
    }

    fn group_by_clause(&self) -> Option<&str> {
        self.group_by_clause.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingQuery {
    pub first_page: String,
    pub remaining_pages: String,
    pub sort_keys: Vec<SortKey>,
}

/// Builds the paging statements of one dialect.
pub type PagingStrategy = fn(&PagingClause, usize) -> PagingQuery;

const STRATEGIES: &[(&str, PagingStrategy)] = &[
    ("postgresql", limit),
    ("oracle", rownum),
    ("mysql", limit),
    ("mariadb", limit),
    ("sqlserver", top),
    ("db2", fetch_first),
    ("h2", fetch_next),
];

/// Strategy for `dialect`, case-insensitive.
pub fn strategy_for(dialect: &str) -> Option<PagingStrategy> {
    let dialect = dialect.trim();
    STRATEGIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(dialect))
        .map(|(_, strategy)| *strategy)
}

pub fn supported_dialects() -> impl Iterator<Item = &'static str> {
    STRATEGIES.iter().map(|(name, _)| *name)
}

/// Paging statements for `clause` in `dialect`.
pub fn paging_query(dialect: &str, clause: &PagingClause, page_size: usize) -> AssemblyResult<PagingQuery> {
    let strategy = strategy_for(dialect).ok_or_else(|| {
        AssemblyError::config(
            "providerType",
            format!(
                "unsupported providerType '{dialect}', expected one of: {}",
                supported_dialects().collect::<Vec<_>>().join(", ")
            ),
        )
    })?;
    if clause.sort_clause.is_empty() {
        return Err(AssemblyError::config(
            "clause.sortClause",
            "at least one sort key is required for paging",
        ));
    }
    if clause.select_clause.trim().is_empty() || clause.from_clause.trim().is_empty() {
        return Err(AssemblyError::config(
            "clause",
            "selectClause and fromClause must be provided",
        ));
    }
    if page_size == 0 {
        return Err(AssemblyError::config("chunk", "page size must be greater than 0"));
    }
    Ok(strategy(clause, page_size))
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Limit,
    Top,
    RowNum,
    FetchFirst,
    FetchNext,
}

fn limit(clause: &PagingClause, page_size: usize) -> PagingQuery {
    render(clause, page_size, Style::Limit)
}

fn top(clause: &PagingClause, page_size: usize) -> PagingQuery {
    render(clause, page_size, Style::Top)
}

fn rownum(clause: &PagingClause, page_size: usize) -> PagingQuery {
    render(clause, page_size, Style::RowNum)
}

fn fetch_first(clause: &PagingClause, page_size: usize) -> PagingQuery {
    render(clause, page_size, Style::FetchFirst)
}

fn fetch_next(clause: &PagingClause, page_size: usize) -> PagingQuery {
    render(clause, page_size, Style::FetchNext)
}

fn render(clause: &PagingClause, page_size: usize, style: Style) -> PagingQuery {
    let select = clause.select_clause.trim();
    let from = clause.from_clause.trim();
    let keys = &clause.sort_clause;

    let first_page = statement(
        style,
        page_size,
        select,
        from,
        clause.where_clause(),
        clause.group_by_clause(),
        &order_by(keys, true),
    );

    let remaining_pages = match clause.group_by_clause() {
        None => {
            let condition = keyset_condition(keys, true);
            let filter = match clause.where_clause() {
                Some(w) => format!("({w}) AND {condition}"),
                None => condition,
            };
            statement(
                style,
                page_size,
                select,
                from,
                Some(&filter),
                None,
                &order_by(keys, true),
            )
        }
        Some(group_by) => {
            let mut inner = format!("SELECT {select} FROM {from}");
            if let Some(w) = clause.where_clause() {
                inner.push_str(&format!(" WHERE {w}"));
            }
            inner.push_str(&format!(" GROUP BY {group_by}"));
            statement(
                style,
                page_size,
                "*",
                &format!("({inner}) MAIN_QRY"),
                Some(&keyset_condition(keys, false)),
                None,
                &order_by(keys, false),
            )
        }
    };

    PagingQuery {
        first_page,
        remaining_pages,
        sort_keys: keys.clone(),
    }
}

fn statement(
    style: Style,
    page_size: usize,
    select: &str,
    from: &str,
    filter: Option<&str>,
    group_by: Option<&str>,
    order_by: &str,
) -> String {
    let mut body = format!("FROM {from}");
    if let Some(filter) = filter {
        body.push_str(&format!(" WHERE {filter}"));
    }
    if let Some(group_by) = group_by {
        body.push_str(&format!(" GROUP BY {group_by}"));
    }
    body.push_str(&format!(" ORDER BY {order_by}"));

    match style {
        Style::Limit => format!("SELECT {select} {body} LIMIT {page_size}"),
        Style::Top => format!("SELECT TOP {page_size} {select} {body}"),
        Style::RowNum => format!("SELECT * FROM (SELECT {select} {body}) WHERE ROWNUM <= {page_size}"),
        Style::FetchFirst => format!("SELECT {select} {body} FETCH FIRST {page_size} ROWS ONLY"),
        Style::FetchNext => format!("SELECT {select} {body} FETCH NEXT {page_size} ROWS ONLY"),
    }
}

fn order_by(keys: &[SortKey], qualified: bool) -> String {
    keys.iter()
        .map(|k| {
            let column = if qualified { k.key.as_str() } else { k.column() };
            format!("{column} {}", k.order.keyword())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `((a > :_a) OR (a = :_a AND b > :_b))` for keys `a, b`.
fn keyset_condition(keys: &[SortKey], qualified: bool) -> String {
    let column = |k: &SortKey| -> String {
        if qualified {
            k.key.clone()
        } else {
            k.column().to_string()
        }
    };
    let branches: Vec<String> = (0..keys.len())
        .map(|i| {
            let mut terms: Vec<String> = keys[..i]
                .iter()
                .map(|k| format!("{} = :{}", column(k), k.parameter()))
                .collect();
            let k = &keys[i];
            terms.push(format!("{} {} :{}", column(k), k.order.after(), k.parameter()));
            format!("({})", terms.join(" AND "))
        })
        .collect();
    format!("({})", branches.join(" OR "))
}

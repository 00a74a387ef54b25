//! Generic resource table: search and client-side pagination over the rows
//! of any resource, driven by its schema.

use crate::resource::ResourceSchema;
use crate::types::Record;
use serde_json::Value;

pub const DEFAULT_PER_PAGE: usize = 10;

/// One page of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub rows: Vec<&'a Record>,
    /// 1-based page number actually served (clamped into range).
    pub page: usize,
    pub per_page: usize,
    pub total_rows: usize,
    pub total_pages: usize,
}

pub struct ResourceTable {
    schema: ResourceSchema,
    rows: Vec<Record>,
}

impl ResourceTable {
    pub fn new(schema: ResourceSchema, rows: Vec<Record>) -> Self {
        Self { schema, rows }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows where any schema field (or the id) contains `query`, ignoring case.
    /// An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Record> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.rows.iter().collect();
        }
        self.rows
            .iter()
            .filter(|row| {
                std::iter::once("id")
                    .chain(self.schema.fields.iter().map(|f| f.name))
                    .filter_map(|name| row.get(name))
                    .any(|value| cell_text(value).to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Slice the search result into a page. Out-of-range pages clamp to the
    /// last page; `per_page` of zero falls back to the default.
    pub fn page<'a>(&'a self, query: &str, page: usize, per_page: usize) -> Page<'a> {
        let matches = self.search(query);
        paginate(matches, page, per_page)
    }
}

fn paginate(rows: Vec<&Record>, page: usize, per_page: usize) -> Page<'_> {
    let per_page = if per_page == 0 { DEFAULT_PER_PAGE } else { per_page };
    let total_rows = rows.len();
    let total_pages = total_rows.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let rows = rows.into_iter().skip(start).take(per_page).collect();
    Page {
        rows,
        page,
        per_page,
        total_rows,
        total_pages,
    }
}

/// Plain-text rendering of a cell value.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        other => other.to_string(),
    }
}

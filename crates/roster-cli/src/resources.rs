//! Resource commands: listing, schema display and CRUD.

use crate::context::AppContext;
use anyhow::{bail, Result};
use roster_client::ApiError;
use roster_core::resource::FieldKind;
use roster_core::table::cell_text;
use roster_core::{Page, RecordId, ResourceKind, ResourceSchema};

const MAX_CELL: usize = 32;

pub fn print_resources() {
    for kind in ResourceKind::ALL {
        let schema = kind.schema();
        let note = if kind.is_read_only() { "  (read-only)" } else { "" };
        println!("{:<24} {}{note}", kind.path(), schema.title);
    }
}

pub fn print_schema(kind: ResourceKind) {
    let schema = kind.schema();
    println!("{} ({})", schema.title, kind.path());
    for field in &schema.fields {
        let mut notes = Vec::new();
        if field.required {
            notes.push("required".to_string());
        }
        if let Some(max) = field.max_len {
            notes.push(format!("max {max}"));
        }
        println!(
            "  {:<28} {:<28} {:<22} {}",
            field.name,
            field.label,
            kind_name(field.kind),
            notes.join(", ")
        );
    }
}

fn kind_name(kind: FieldKind) -> String {
    match kind {
        FieldKind::Text => "text".into(),
        FieldKind::LongText => "long text".into(),
        FieldKind::Boolean => "boolean".into(),
        FieldKind::Reference(target) => format!("ref -> {}", target.path()),
    }
}

pub async fn list(
    ctx: &AppContext,
    kind: ResourceKind,
    search: &str,
    page: usize,
    per_page: usize,
) -> Result<()> {
    let mut failure = None;
    let rows = ctx
        .api
        .fetch_list_or_empty(kind.api_base(), kind.path(), |e: &ApiError| {
            failure = Some(e.user_message(&format!("Failed to load {}", kind.path())));
        })
        .await;
    if let Some(message) = failure {
        eprintln!("{message}");
    }
    let table = roster_core::ResourceTable::new(kind.schema(), rows);
    print!("{}", render_page(table.schema(), &table.page(search, page, per_page)));
    Ok(())
}

/// Text table: id plus every schema field, truncated to a fixed width.
pub fn render_page(schema: &ResourceSchema, page: &Page<'_>) -> String {
    let headers: Vec<&str> = std::iter::once("ID")
        .chain(schema.fields.iter().map(|f| f.label))
        .collect();
    let rows: Vec<Vec<String>> = page
        .rows
        .iter()
        .map(|row| {
            std::iter::once("id")
                .chain(schema.fields.iter().map(|f| f.name))
                .map(|name| row.get(name).map(cell_text).unwrap_or_default())
                .map(|text| truncate(&text.replace('\n', " ")))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.iter().map(|h| h.to_string()).collect()));
    out.push('\n');
    if rows.is_empty() {
        out.push_str(&format!("No {} found.\n", schema.title.to_lowercase()));
    }
    for row in rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out.push_str(&format!(
        "Page {} of {} ({} rows)\n",
        page.page, page.total_pages, page.total_rows
    ));
    out
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_CELL - 1).collect();
    cut.push('…');
    cut
}

pub async fn add(ctx: &AppContext, kind: ResourceKind, assignments: &[String]) -> Result<()> {
    let schema = kind.schema();
    let record = schema.parse_assignments(assignments.iter().map(String::as_str))?;
    let created = ctx.api.create_record(kind, &record).await.map_err(|e| {
        anyhow::anyhow!(e.user_message(&format!("Failed to create {}", schema.singular)))
    })?;
    match RecordId::from_record(&created) {
        Some(id) => println!("Created {} {id}.", schema.singular),
        None => println!("Created {}.", schema.singular),
    }
    Ok(())
}

pub async fn edit(
    ctx: &AppContext,
    kind: ResourceKind,
    id: RecordId,
    assignments: &[String],
) -> Result<()> {
    let schema = kind.schema();
    if assignments.is_empty() {
        bail!("nothing to change; pass one or more field=value pairs");
    }
    let changes = schema.parse_assignments(assignments.iter().map(String::as_str))?;
    ctx.api
        .update_record(kind, &id, &changes)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message(&format!("Failed to update {}", schema.singular))))?;
    println!("Updated {} {id}.", schema.singular);
    Ok(())
}

pub async fn delete(ctx: &AppContext, kind: ResourceKind, id: RecordId) -> Result<()> {
    let schema = kind.schema();
    ctx.api
        .delete_record(kind, &id)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message(&format!("Failed to delete {}", schema.singular))))?;
    println!("Deleted {} {id}.", schema.singular);
    Ok(())
}

// Prompt construction for SQL generation and result explanation
use crate::models::{ResultSet, Schema};

/// Sample rows rendered per table
const MAX_SAMPLE_ROWS: usize = 3;

/// Rows embedded in an explanation prompt
const MAX_RESULT_ROWS: usize = 50;

/// Full schema rendering used to ground SQL generation
pub fn render_schema(schema: &Schema) -> String {
    let mut context = String::new();

    for table in &schema.tables {
        context.push_str(&format!("Table: {}\n", table.name));
        if let Some(description) = &table.description {
            context.push_str(&format!("Description: {}\n", description));
        }
        context.push_str("Columns:\n");
        for column in &table.columns {
            context.push_str(&format!("  - {} ({})", column.name, column.data_type));
            if let Some(description) = &column.description {
                context.push_str(&format!(": {}", description));
            }
            context.push('\n');
        }
        if !table.sample_data.is_empty() {
            context.push_str("Sample rows:\n");
            for row in table.sample_data.iter().take(MAX_SAMPLE_ROWS) {
                let rendered = serde_json::to_string(row).unwrap_or_default();
                context.push_str(&format!("  {}\n", rendered));
            }
        }
        context.push('\n');
    }

    context
}

/// One line per table: `name(col type, ...)`
pub fn render_compact_schema(schema: &Schema) -> String {
    schema
        .tables
        .iter()
        .map(|table| {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            format!("{}({})", table.name, columns.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn sql_generation_prompt(question: &str, schema: &Schema) -> String {
    format!(
        r#"You are a PostgreSQL expert. Given a database schema and a natural language question, write one read-only SQL query that answers it.

Database schema:
{schema_context}
Question: "{question}"

Instructions:
1. Return ONLY a single SELECT statement. No explanations, no markdown, no comments.
2. Never write INSERT, UPDATE, DELETE, DROP, ALTER, CREATE or any other statement that changes data.
3. Use only the tables and columns listed in the schema above.
4. When the question asks for whole entities (for example "all doctors"), use SELECT *.
5. When the question names specific columns, select exactly those columns.
6. For questions about relationships between tables (for example "doctors who have patients"), use EXISTS or JOIN with short table aliases such as d and p.
7. For "how many" or "count" questions, use COUNT(*).

SQL Query:"#,
        schema_context = render_schema(schema),
        question = question,
    )
}

pub fn summary_prompt(question: &str, sql: &str, schema: &Schema, rows: &ResultSet) -> String {
    let shown: Vec<_> = rows.iter().take(MAX_RESULT_ROWS).collect();
    let rows_json = serde_json::to_string(&shown).unwrap_or_else(|_| "[]".to_string());
    let truncated = if rows.len() > MAX_RESULT_ROWS {
        format!("\n(Showing {} of {} rows.)", MAX_RESULT_ROWS, rows.len())
    } else {
        String::new()
    };

    format!(
        r#"A user asked a question about a database. Explain the answer in plain language.

Question: "{question}"

SQL that was run:
{sql}

Schema:
{schema}

Result rows ({count} total):
{rows_json}{truncated}

Answer the question directly in at most 3-4 sentences. Mention specific names or numbers from the rows where helpful. Do not use SQL jargon and do not describe the query itself."#,
        question = question,
        sql = sql,
        schema = render_compact_schema(schema),
        count = rows.len(),
        rows_json = rows_json,
        truncated = truncated,
    )
}

// Fixed sample data used when the live store is unavailable or returns nothing.
//
// The fallback schema's sample rows and the executor's mock rows are the same
// fixtures, so prompts, answers and substituted data always agree.

use lazy_static::lazy_static;
use serde_json::{json, Value};

use crate::models::{Column, ResultSet, Schema, SchemaOrigin, Table};

lazy_static! {
    static ref MOCK_TABLES: Vec<(&'static str, ResultSet)> = vec![
        (
            "hospitals",
            rows(json!([
                { "id": 1, "name": "General Hospital", "city": "New York", "beds": 500 },
                { "id": 2, "name": "Community Medical", "city": "Boston", "beds": 200 },
                { "id": 3, "name": "Central Hospital", "city": "Chicago", "beds": 350 },
            ])),
        ),
        (
            "doctors",
            rows(json!([
                { "id": 1, "name": "Dr. Smith", "phone_number": "555-123-4567", "email": "smith@hospital.com", "hospital_id": 1 },
                { "id": 2, "name": "Dr. Johnson", "phone_number": "555-234-5678", "email": "johnson@hospital.com", "hospital_id": 2 },
                { "id": 3, "name": "Dr. Williams", "phone_number": "555-345-6789", "email": "williams@hospital.com", "hospital_id": 3 },
            ])),
        ),
        (
            "patients",
            rows(json!([
                { "id": 1, "name": "John Doe", "age": 45, "doctor_id": 1 },
                { "id": 2, "name": "Jane Smith", "age": 38, "doctor_id": 2 },
                { "id": 3, "name": "Bob Johnson", "age": 67, "doctor_id": 1 },
                { "id": 4, "name": "Alice Brown", "age": 52, "doctor_id": 3 },
                { "id": 5, "name": "Tom Wilson", "age": 29, "doctor_id": 2 },
                { "id": 6, "name": "Sarah Lee", "age": 41, "doctor_id": 3 },
            ])),
        ),
    ];
}

fn rows(value: Value) -> ResultSet {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Mock rows for a table, matched case-insensitively
pub fn mock_rows(table: &str) -> Option<&'static ResultSet> {
    MOCK_TABLES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(table))
        .map(|(_, rows)| rows)
}

/// The schema used whenever live introspection fails or finds nothing
pub fn fallback_schema() -> Schema {
    let sample = |name: &str| mock_rows(name).cloned().unwrap_or_default();

    Schema::new(
        vec![
            Table::new(
                "hospitals",
                Some("Healthcare facilities"),
                vec![
                    Column::new("id", "integer", Some("Primary key")),
                    Column::new("name", "text", Some("Hospital name")),
                    Column::new("city", "text", Some("City location")),
                    Column::new("beds", "integer", Some("Number of beds")),
                ],
            )
            .with_sample_data(sample("hospitals")),
            Table::new(
                "doctors",
                Some("Medical professionals who treat patients"),
                vec![
                    Column::new("id", "integer", Some("Primary key")),
                    Column::new("name", "text", Some("Doctor name")),
                    Column::new("phone_number", "text", Some("Contact phone number")),
                    Column::new("email", "text", Some("Email address")),
                    Column::new(
                        "hospital_id",
                        "integer",
                        Some("Foreign key to hospitals table, links doctor to their hospital"),
                    ),
                ],
            )
            .with_sample_data(sample("doctors")),
            Table::new(
                "patients",
                Some("People receiving medical care, each assigned to a doctor"),
                vec![
                    Column::new("id", "integer", Some("Primary key")),
                    Column::new("name", "text", Some("Patient name")),
                    Column::new("age", "integer", Some("Patient age")),
                    Column::new(
                        "doctor_id",
                        "integer",
                        Some("Foreign key to doctors table, links patient to their assigned doctor"),
                    ),
                ],
            )
            .with_sample_data(sample("patients")),
        ],
        SchemaOrigin::Fallback,
    )
}

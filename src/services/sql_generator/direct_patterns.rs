//! High-confidence shortcuts that never need the model.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{Schema, Table};

lazy_static! {
    /// "list all hospitals", "show me the doctors", "all patients"
    static ref LIST_ENTITY: Regex = Regex::new(
        r"^(?:please\s+)?(?:(?:list|show|get|find|give)(?:\s+me)?(?:\s+all)?|all)(?:\s+(?:of\s+)?the)?\s+([a-z_][a-z0-9_]*)[\s?.!]*$"
    )
    .unwrap();
    /// "doctors with at least one patient", "which doctors have patients"
    static ref DOCTOR_HAS_PATIENT: Regex = Regex::new(
        r"\bdoctors?\b.*\b(?:with|has|have|having)\b.*\bpatients?\b"
    )
    .unwrap();
    static ref NEGATION: Regex = Regex::new(r"\b(?:no|not|without|zero|none)\b").unwrap();
}

/// Match a normalized (trimmed, lower-cased) question against the shortcuts
pub fn match_direct_pattern(normalized: &str, schema: &Schema) -> Option<String> {
    if let Some(sql) = doctor_patient_relationship(normalized, schema) {
        return Some(sql);
    }

    let caps = LIST_ENTITY.captures(normalized)?;
    let entity = caps.get(1)?.as_str();
    let table = schema
        .tables
        .iter()
        .find(|t| t.name.to_lowercase() == entity || t.singular_name() == entity)?;
    Some(format!("SELECT * FROM {}", table.name))
}

fn doctor_patient_relationship(normalized: &str, schema: &Schema) -> Option<String> {
    if !DOCTOR_HAS_PATIENT.is_match(normalized) || NEGATION.is_match(normalized) {
        return None;
    }
    let doctors = schema.find_table("doctors")?;
    let patients = schema.find_table("patients")?;
    if !has_column(patients, "doctor_id") || !has_column(doctors, "id") {
        return None;
    }

    Some(format!(
        "SELECT d.* FROM {} d WHERE EXISTS (SELECT 1 FROM {} p WHERE p.doctor_id = d.id)",
        doctors.name, patients.name
    ))
}

fn has_column(table: &Table, name: &str) -> bool {
    table.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
}

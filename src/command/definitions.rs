//! Static command menu and field schema validation

use std::collections::BTreeMap;

use groundlink_shared::{CommandDef, CommandDefinitions, FieldDef, FieldType, FieldValue};

/// The command menu published to ground control for this satellite
pub fn command_definitions(system: &str) -> CommandDefinitions {
    CommandDefinitions {
        system: system.into(),
        definitions: menu(),
    }
}

pub(crate) fn menu() -> BTreeMap<String, CommandDef> {
    let mut defs = BTreeMap::new();
    defs.insert(
        "ping".into(),
        CommandDef {
            display_name: "Ping".into(),
            description: "Ping".into(),
            fields: vec![],
        },
    );
    defs.insert(
        "error".into(),
        CommandDef {
            display_name: "Error Command".into(),
            description: "Always errors to show the error process.".into(),
            fields: vec![],
        },
    );
    defs.insert(
        "connect".into(),
        CommandDef {
            display_name: "Establish RF Lock".into(),
            description: "Points antennas and starts broadcasting carrier signal to establish RF lock with the spacecraft.".into(),
            fields: vec![],
        },
    );
    defs.insert(
        "safemode".into(),
        CommandDef {
            display_name: "Safemode Command".into(),
            description: "Commands the spacecraft into safemode, shutting down all non-essential systems.".into(),
            fields: vec![],
        },
    );
    defs.insert(
        "update_file_list".into(),
        CommandDef {
            display_name: "Update File List".into(),
            description: "Downlinks the latest file list from the spacecraft.".into(),
            fields: vec![FieldDef {
                name: "show_hidden".into(),
                field_type: FieldType::Boolean,
                range: None,
                default: Some(FieldValue::Boolean(false)),
            }],
        },
    );
    defs.insert(
        "telemetry".into(),
        CommandDef {
            display_name: "Start Telemetry Beacon".into(),
            description: "Commands the spacecraft to beacon Health and Status Telemetry".into(),
            fields: vec![
                FieldDef {
                    name: "mode".into(),
                    field_type: FieldType::String,
                    range: Some(vec![
                        FieldValue::String("NOMINAL".into()),
                        FieldValue::String("ERROR".into()),
                    ]),
                    default: None,
                },
                FieldDef {
                    name: "duration".into(),
                    field_type: FieldType::Integer,
                    range: None,
                    default: Some(FieldValue::Integer(300)),
                },
            ],
        },
    );
    defs
}

/// Validate a command's fields against its declared schema.
///
/// Returns the effective fields (defaults applied) or every violation
/// found. Fields the schema does not declare pass through untouched.
pub(crate) fn validate_fields(
    def: &CommandDef,
    fields: &BTreeMap<String, FieldValue>,
) -> Result<BTreeMap<String, FieldValue>, Vec<String>> {
    let mut effective = fields.clone();
    let mut errors = Vec::new();

    for decl in &def.fields {
        let value = match effective.get(&decl.name) {
            Some(value) => value.clone(),
            None => match &decl.default {
                Some(default) => {
                    effective.insert(decl.name.clone(), default.clone());
                    default.clone()
                }
                None => {
                    errors.push(format!("missing required field '{}'", decl.name));
                    continue;
                }
            },
        };

        let type_ok = match decl.field_type {
            FieldType::String => matches!(value, FieldValue::String(_)),
            FieldType::Integer => matches!(value, FieldValue::Integer(_)),
            FieldType::Boolean => matches!(value, FieldValue::Boolean(_)),
        };
        if !type_ok {
            errors.push(format!(
                "field '{}' must be {} (got {})",
                decl.name,
                decl.field_type,
                value.type_name()
            ));
            continue;
        }

        if let Some(range) = &decl.range {
            if !range.contains(&value) {
                let allowed: Vec<String> = range.iter().map(|v| v.to_string()).collect();
                errors.push(format!(
                    "field '{}' must be one of [{}] (got {value})",
                    decl.name,
                    allowed.join(", ")
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(effective)
    } else {
        Err(errors)
    }
}

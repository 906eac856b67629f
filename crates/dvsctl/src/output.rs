use std::io::Write;

use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;

use crate::cli;
use crate::error::{DvsCtlError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
}

impl From<cli::OutputFormat> for OutputFormat {
    /// `auto` renders tables for people; scripts ask for json or yaml
    fn from(format: cli::OutputFormat) -> Self {
        match format {
            cli::OutputFormat::Json => OutputFormat::Json,
            cli::OutputFormat::Yaml => OutputFormat::Yaml,
            cli::OutputFormat::Table | cli::OutputFormat::Auto => OutputFormat::Table,
        }
    }
}

impl OutputFormat {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json | Self::Yaml)
    }
}

pub fn print_output<T: Serialize>(data: T, format: OutputFormat) -> Result<()> {
    let rendered = render(data, format)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Render `data` as it would be printed, trailing newline included
pub fn render<T: Serialize>(data: T, format: OutputFormat) -> Result<String> {
    let json_value = serde_json::to_value(data)?;

    let rendered = match format {
        OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(&json_value)?),
        OutputFormat::Yaml => {
            serde_yaml::to_string(&json_value).map_err(|e| DvsCtlError::OutputError {
                message: format!("YAML error: {}", e),
            })?
        }
        OutputFormat::Table => format!("{}\n", render_table(&json_value)),
    };
    Ok(rendered)
}

pub fn render_table(value: &Value) -> String {
    match value {
        Value::Array(arr) if !arr.is_empty() => {
            let mut table = Table::new();

            if let Value::Object(first) = &arr[0] {
                let headers: Vec<String> = first.keys().cloned().collect();
                table.set_header(&headers);

                for item in arr {
                    if let Value::Object(obj) = item {
                        let row: Vec<String> = headers
                            .iter()
                            .map(|h| format_value(obj.get(h).unwrap_or(&Value::Null)))
                            .collect();
                        table.add_row(row);
                    }
                }
            } else {
                table.set_header(vec!["Value"]);
                for item in arr {
                    table.add_row(vec![format_value(item)]);
                }
            }

            table.to_string()
        }
        Value::Object(obj) => {
            let mut table = Table::new();
            table.set_header(vec!["Field", "Value"]);

            for (key, val) in obj {
                table.add_row(vec![key.clone(), format_value(val)]);
            }

            table.to_string()
        }
        _ => format_value(value),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) if arr.iter().all(|v| !v.is_object() && !v.is_array()) => arr
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        // Managed object references read better as type:value
        Value::Object(obj) => match (obj.get("type"), obj.get("value")) {
            (Some(Value::String(kind)), Some(Value::String(id)))
                if obj.keys().all(|k| matches!(k.as_str(), "type" | "value" | "_typeName")) =>
            {
                format!("{}:{}", kind, id)
            }
            _ => format!("{{{} fields}}", obj.len()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvsctl_core::ManagedObjectRef;
    use serde_json::json;

    #[test]
    fn auto_means_table() {
        assert_eq!(OutputFormat::from(cli::OutputFormat::Auto), OutputFormat::Table);
        assert!(OutputFormat::from(cli::OutputFormat::Yaml).is_structured());
    }

    #[test]
    fn object_renders_as_field_table() {
        let rendered = render_table(&json!({
            "switch": {"type": "VmwareDistributedVirtualSwitch", "value": "dvs-42"},
            "port_group": null,
        }));
        assert!(rendered.contains("VmwareDistributedVirtualSwitch:dvs-42"));
        assert!(rendered.contains("Field"));
    }

    #[test]
    fn serialized_managed_object_ref_renders_as_type_and_value() {
        let switch = ManagedObjectRef::new("VmwareDistributedVirtualSwitch", "dvs-42");
        let rendered = render_table(&json!({"name": "dvs-01", "switch": switch}));
        assert!(rendered.contains("VmwareDistributedVirtualSwitch:dvs-42"));
        assert!(!rendered.contains("fields"));
    }

    #[test]
    fn objects_with_extra_keys_are_not_refs() {
        let value = json!({"type": "a", "value": "b", "name": "c"});
        assert_eq!(format_value(&value), "{3 fields}");
    }

    #[test]
    fn serialization_failures_are_output_errors() {
        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], "non-string key");
        let err = render(&bad, OutputFormat::Json).unwrap_err();
        assert!(matches!(err, DvsCtlError::OutputError { .. }), "got {err:?}");
        assert!(err.to_string().starts_with("Output formatting error"));
    }

    #[test]
    fn json_rendering_ends_with_newline() {
        let rendered = render(json!({"name": "dvs-01"}), OutputFormat::Json).unwrap();
        assert!(rendered.ends_with("}\n"));
    }

    #[test]
    fn array_of_objects_uses_keys_as_headers() {
        let rendered = render_table(&json!([
            {"name": "lab", "host": "vc.lab"},
            {"name": "prod", "host": "vc.prod"},
        ]));
        assert!(rendered.contains("host"));
        assert!(rendered.contains("vc.prod"));
    }

    #[test]
    fn scalar_arrays_are_joined() {
        assert_eq!(format_value(&json!(["vmnic1", "vmnic2"])), "vmnic1, vmnic2");
        assert_eq!(format_value(&json!([{"a": 1}])), "[1 items]");
    }
}

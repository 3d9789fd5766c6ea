use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::realtime::error::FetchError;
use crate::types::ResourceType;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Report per-resource snapshot results after startup. Failed loads are
/// reported but not fatal; the mirror stays empty until a reload.
pub fn output_load_results(
    output_format: &OutputFormat,
    results: &[(ResourceType, Result<usize, FetchError>)],
) -> anyhow::Result<()> {
    for (resource, result) in results {
        match result {
            Ok(count) => output_success(
                output_format,
                &format!("Loaded {} ({} rows)", resource, count),
                Some(json!({ "resource": resource, "count": count })),
            )?,
            Err(e) => output_error(output_format, &format!("Failed to load {}: {}", resource, e), Some("SNAPSHOT_FAILED"))?,
        }
    }
    Ok(())
}

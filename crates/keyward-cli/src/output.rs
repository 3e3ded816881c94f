use color_eyre::Result;
use serde_json::Value;

/// Print a command result as pretty JSON on stdout.
pub fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

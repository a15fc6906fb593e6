use std::io::Read as _;

use scenario_ai_harness::ingest::recover;
use scenario_ai_harness::observability::init_observability;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_observability();

    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    let value = recover(&text)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

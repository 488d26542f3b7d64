use crate::orchestrator::Scenario;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load, parse and validate a scenario from a YAML file
pub fn load_scenario(scenario_path: &Path) -> Result<Scenario> {
    info!("Loading scenario from: {:?}", scenario_path);

    let file = File::open(scenario_path)
        .wrap_err_with(|| format!("Failed to open scenario file {:?}", scenario_path))?;

    let scenario: Scenario = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse scenario file {:?}", scenario_path))?;

    scenario.validate()?;

    info!(
        "Loaded scenario {} with {} step(s)",
        scenario.name.as_deref().unwrap_or("<unnamed>"),
        scenario.steps.len()
    );
    Ok(scenario)
}

/// Parse a scenario held in memory
pub fn parse_scenario(yaml: &str) -> Result<Scenario> {
    let scenario: Scenario = serde_yaml::from_str(yaml).wrap_err("Failed to parse scenario")?;
    scenario.validate()?;
    Ok(scenario)
}

use sessionguard::settings::*;

fn main() -> anyhow::Result<()> {
    // Load settings from the default location
    let project_settings = parse_settings(None)?;
    println!("Loaded settings: {:?}", project_settings);

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    // Attempt to load from a custom path
    // $ cargo run --bin settings_demo -- --settings=settings/dev.toml
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    println!("Loaded settings: {:?}", project_settings);

    // Secrets are resolved from the environment variables the settings name
    match Secrets::from_env(&project_settings) {
        Ok(secrets) => println!("Resolved secrets: {:?}", secrets),
        Err(e) => println!("Secrets unavailable: {}", e),
    }

    Ok(())
}

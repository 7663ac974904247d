//! `reagent config` — Configuration management commands.

use reagent_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ok  Config parsed and validated");

            if !config.has_api_key() {
                println!();
                println!(
                    "   warning  No API key set (set DASHSCOPE_API_KEY, OPENAI_API_KEY or REAGENT_API_KEY)"
                );
            }

            println!();
            println!("   Gateway:    {}", config.gateway.name);
            println!(
                "   Endpoint:   {}/{}",
                config.gateway.base_url.trim_end_matches('/'),
                config.gateway.path.trim_start_matches('/')
            );
            println!("   Model:      {}", config.gateway.model);
            println!("   Max steps:  {}", config.agent.max_steps);
            println!("   Streaming:  {}", config.agent.streaming);
        }
        Err(e) => {
            println!("   error  {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

/// Replace secrets before printing.
fn redacted(mut config: AppConfig) -> AppConfig {
    if config.gateway.api_key.is_some() {
        config.gateway.api_key = Some("[REDACTED]".into());
    }
    config
}

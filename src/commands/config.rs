//! Configuration file commands.

use super::{CommandResult, Context};

/// Write the default configuration to the active config path
pub fn init(ctx: &Context, force: bool) -> CommandResult {
    if ctx.config_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            ctx.config_path.display()
        )
        .into());
    }
    crate::config::Config::default().save(&ctx.config_path)?;
    println!("Wrote {}", ctx.config_path.display());
    Ok(())
}

pub fn show(ctx: &Context) -> CommandResult {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&ctx.config)?);
    } else {
        println!("# {}", ctx.config_path.display());
        print!("{}", toml::to_string_pretty(&ctx.config)?);
    }
    Ok(())
}

use clap::Subcommand;
use mx_config::Options;
use mx_system::Session;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective options as TOML
    Show,
    /// Print where option files are read from
    Path,
}

pub fn cmd_config(session: &mut Session, command: ConfigCommands) {
    match command {
        ConfigCommands::Show => {
            let rendered = session.options().to_toml();
            session.console.log(Some(rendered.trim_end()));
        }
        ConfigCommands::Path => {
            let global = Options::global_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<no home directory>".to_string());
            session.console.log(Some(&format!("Global: {global}")));
            session.console.log(Some(&format!(
                "Project: {}",
                Options::project_config_path().display()
            )));
        }
    }
}

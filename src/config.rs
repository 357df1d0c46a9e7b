use clap::Parser;
use std::path::Path;

/// Hockey shift analytics: H2H, WOWY, line combinations and shift quality
#[derive(Parser, Debug, Clone)]
#[command(name = "shift-analytics", version, about)]
pub struct Config {
    /// Shift participation log (CSV)
    #[arg(long, env = "SHIFT_LOG_PATH", default_value = "shift_participation.csv")]
    pub input: String,

    /// SQLite warehouse path
    #[arg(long, env = "DATABASE_PATH", default_value = "shift_analytics.db")]
    pub database_path: String,

    /// Also write the full output as JSON to this path
    #[arg(long, env = "JSON_OUTPUT_PATH")]
    pub json_output: Option<String>,

    /// Compute everything but skip the SQLite write
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Worker threads for the partition fan-out (0 = one per core)
    #[arg(long, env = "ENGINE_THREADS", default_value = "0")]
    pub threads: usize,

    /// Process games one at a time on the calling thread
    #[arg(long, env = "ENGINE_SEQUENTIAL", default_value = "false")]
    pub sequential: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input.trim().is_empty() {
            anyhow::bail!("input path must not be empty");
        }
        if !self.dry_run && self.database_path.trim().is_empty() {
            anyhow::bail!("DATABASE_PATH is required unless --dry-run is set");
        }
        if let Some(json) = &self.json_output {
            let parent = Path::new(json).parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(dir) = parent {
                if !dir.is_dir() {
                    anyhow::bail!("JSON output directory {} does not exist", dir.display());
                }
            }
        }
        if self.threads > 1024 {
            anyhow::bail!("threads must be between 0 and 1024");
        }
        Ok(())
    }
}

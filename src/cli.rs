use clap::Parser;
use std::path::PathBuf;

use crate::config::{ClusteringPredicate, Config};

#[derive(Parser)]
#[command(name = "aquatone")]
#[command(about = "HTTP-based attack surface reconnaissance")]
#[command(version)]
pub struct Cli {
    #[arg(short, long, help = "File of newline-separated hosts and URLs to probe")]
    pub input: Option<PathBuf>,

    #[arg(
        short,
        long,
        default_value = ".",
        help = "Directory receiving outputs; \"none\" disables screenshots, fingerprinting and the report"
    )]
    pub out_dir: PathBuf,

    #[arg(long, help = "Load a session file and regenerate the HTML report")]
    pub session: Option<PathBuf>,

    #[arg(long, help = "Custom HTML report template")]
    pub template_path: Option<PathBuf>,

    #[arg(long, default_value_t = 100, help = "TCP connect timeout in milliseconds")]
    pub scan_timeout: u64,

    #[arg(long, default_value_t = 15_000, help = "HTTP request timeout in milliseconds")]
    pub http_timeout: u64,

    #[arg(long, help = "Outbound HTTP proxy URL")]
    pub proxy: Option<String>,

    #[arg(long, help = "Do not persist response bodies")]
    pub no_save_body: bool,

    #[arg(long, help = "Worker threads for the dispatcher")]
    pub threads: Option<usize>,

    #[arg(
        long,
        value_enum,
        default_value = "literal",
        help = "Polarity of the page-similarity cluster membership test"
    )]
    pub clustering_predicate: ClusteringPredicate,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    pub fn to_config(&self) -> Config {
        let defaults = Config::default();
        Config {
            input: self.input.clone(),
            out_dir: self.out_dir.clone(),
            session_path: self.session.clone(),
            template_path: self.template_path.clone(),
            scan_timeout: self.scan_timeout,
            http_timeout: self.http_timeout,
            proxy: self.proxy.clone(),
            save_body: !self.no_save_body,
            threads: self.threads.unwrap_or(defaults.threads),
            clustering_predicate: self.clustering_predicate,
        }
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_map_to_config() {
        let cli = Cli::parse_from(["aquatone", "--input", "targets.txt"]);
        let config = cli.to_config();
        assert_eq!(config.input, Some(PathBuf::from("targets.txt")));
        assert_eq!(config.scan_timeout, 100);
        assert_eq!(config.http_timeout, 15_000);
        assert!(config.save_body);
        assert!(!config.report_only());
        assert_eq!(config.clustering_predicate, ClusteringPredicate::Literal);
    }

    #[test]
    fn test_cli_flag_overrides() {
        let cli = Cli::parse_from([
            "aquatone",
            "--input",
            "targets.txt",
            "--scan-timeout",
            "500",
            "--no-save-body",
            "--clustering-predicate",
            "fixed",
            "--out-dir",
            "none",
        ]);
        let config = cli.to_config();
        assert_eq!(config.scan_timeout, 500);
        assert!(!config.save_body);
        assert_eq!(config.clustering_predicate, ClusteringPredicate::Fixed);
        assert!(config.out_dir_disabled());
    }

    #[test]
    fn test_session_flag_selects_report_mode() {
        let cli = Cli::parse_from(["aquatone", "--session", "aquatone_session.json"]);
        assert!(cli.to_config().report_only());
    }
}

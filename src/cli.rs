use crate::cache::{CacheSettings, CacheStep};
use clap::{Args, Parser, Subcommand};

/// Command line interface for the application
#[derive(Parser, Debug)]
#[command(name = "jobsearch", version, about = "Durable job-search research queue")]
pub struct Cli {
    /// Path to the YAML configuration file; defaults apply when it is missing
    #[arg(short, long, global = true, default_value = "jobsearch.yaml")]
    pub config: String,

    /// Sets the logging verbosity level for the application
    /// Possible values: "error", "warn", "info", "debug", "trace"
    /// Default: "info"
    #[arg(long, global = true, default_value_t = String::from("info"))]
    pub logging_level: String,

    /// Shorthand for `--logging-level debug`
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Effective log level after `--verbose`
    pub fn log_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.logging_level
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the task store, optionally dropping existing tasks
    InitDb {
        #[arg(long)]
        reset: bool,
    },
    /// Enqueue a task
    Create {
        /// Task type, e.g. company_research or generate_reply
        task_type: String,
        /// Task arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Show one task
    Get { id: String },
    /// List tasks in creation order
    List {
        /// Only tasks with this status (pending, running, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Run the task processor until SIGINT or SIGTERM
    Daemon {
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Serve the HTTP producer API
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Step cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
    /// Child side of the isolated executor; reads a request on stdin
    #[command(hide = true)]
    Worker,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Delete cached results, for one stage or all of them
    Clear {
        #[arg(long, value_enum)]
        stage: Option<CacheStep>,
    },
}

/// Cache policy flags; each one overrides the configuration file
#[derive(Args, Debug, Default, Clone)]
pub struct CacheArgs {
    /// Bypass the cache entirely
    #[arg(long)]
    pub no_cache: bool,
    /// Cache only stages up to and including this one
    #[arg(long, value_enum)]
    pub cache_until: Option<CacheStep>,
    /// Clear cached results of these stages before each run
    #[arg(long, value_enum, num_args = 1..)]
    pub clear_cache: Vec<CacheStep>,
    /// Clear the whole cache before each run
    #[arg(long)]
    pub clear_all_cache: bool,
}

impl CacheArgs {
    /// Merges the flags over the policy from the configuration file
    pub fn apply(&self, mut settings: CacheSettings) -> CacheSettings {
        if self.no_cache {
            settings.no_cache = true;
        }
        if self.cache_until.is_some() {
            settings.cache_until = self.cache_until;
        }
        if !self.clear_cache.is_empty() {
            settings.clear_cache = self.clear_cache.clone();
        }
        if self.clear_all_cache {
            settings.clear_all_cache = true;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daemon_cache_flags() {
        let cli = Cli::try_parse_from([
            "jobsearch",
            "daemon",
            "--cache-until",
            "basic_research",
            "--clear-cache",
            "reply",
            "followup_research",
        ])
        .unwrap();

        let Command::Daemon { cache } = cli.command else {
            panic!("expected daemon command");
        };
        let settings = cache.apply(CacheSettings {
            no_cache: false,
            clear_cache: vec![CacheStep::GetMessages],
            cache_until: None,
            clear_all_cache: false,
        });
        assert_eq!(settings.cache_until, Some(CacheStep::BasicResearch));
        assert_eq!(
            settings.clear_cache,
            vec![CacheStep::Reply, CacheStep::FollowupResearch]
        );
    }

    #[test]
    fn verbose_forces_debug() {
        let cli = Cli::try_parse_from(["jobsearch", "-v", "list"]).unwrap();
        assert_eq!(cli.log_level(), "debug");
        assert_eq!(cli.config, "jobsearch.yaml");
    }

    #[test]
    fn create_takes_type_and_args() {
        let cli = Cli::try_parse_from([
            "jobsearch",
            "create",
            "company_research",
            "--args",
            r#"{"company_name":"Acme"}"#,
        ])
        .unwrap();
        match cli.command {
            Command::Create { task_type, args } => {
                assert_eq!(task_type, "company_research");
                assert_eq!(args, r#"{"company_name":"Acme"}"#);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Watch,
    SelfCheck,
}

#[derive(Debug)]
pub struct Args {
    pub mode: Mode,
    pub config_path: PathBuf,
    pub assets_dir: Option<PathBuf>,
    pub debug_mode: bool,
    pub timeout_secs: Option<u64>,
}

impl Args {
    pub fn parse() -> Option<Self> {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut mode = Mode::Watch;
        let mut config_path = PathBuf::from("config.json");
        let mut assets_dir: Option<PathBuf> = None;
        let mut debug_mode: bool = false;
        let mut timeout_secs: Option<u64> = None;

        for arg in args {
            if arg == "--help" || arg == "-h" {
                print_help();
                return None;
            } else if arg == "--version" || arg == "-v" {
                println!("EVE Sentry v{}", env!("CARGO_PKG_VERSION"));
                return None;
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--self-check" {
                mode = Mode::SelfCheck;
            } else if let Some(val) = arg.strip_prefix("--config=") {
                config_path = PathBuf::from(val);
            } else if let Some(val) = arg.strip_prefix("--assets=") {
                assets_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--timeout=") {
                match val.parse::<u64>() {
                    Ok(secs) => timeout_secs = Some(secs),
                    Err(_) => {
                        eprintln!("❌ Invalid timeout value: {}", val);
                        return None;
                    }
                }
            } else {
                eprintln!("❌ Unknown argument: {}", arg);
                print_help();
                return None;
            }
        }

        Some(Args {
            mode,
            config_path,
            assets_dir,
            debug_mode,
            timeout_secs,
        })
    }
}

fn print_help() {
    println!("🛡️ EVE Sentry - local/overview threat watcher");
    println!();
    println!("USAGE:");
    println!("    eve-sentry [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("    (no flags)          Watch the configured regions until Ctrl+C");
    println!("    --config=PATH       Config file to load and update (default: config.json)");
    println!("    --assets=PATH       Template asset root (overrides the config file)");
    println!("    --self-check        Load templates, print their status, and exit");
    println!("    --debug             Enable debug logging (per-cycle status lines)");
    println!("    --timeout=N         Stop after N seconds (for testing)");
    println!("    --help, -h          Show this help message");
    println!("    --version, -v       Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    eve-sentry --self-check --assets=./assets");
    println!("    eve-sentry --config=alt.json --debug");
    println!("    eve-sentry --timeout=60");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Option<Args> {
        Args::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.mode, Mode::Watch);
        assert_eq!(args.config_path, PathBuf::from("config.json"));
        assert!(args.assets_dir.is_none());
        assert!(!args.debug_mode);
        assert!(args.timeout_secs.is_none());
    }

    #[test]
    fn test_all_flags() {
        let args = parse(&[
            "--config=alt.json",
            "--assets=/tmp/a",
            "--debug",
            "--timeout=30",
            "--self-check",
        ])
        .unwrap();
        assert_eq!(args.mode, Mode::SelfCheck);
        assert_eq!(args.config_path, PathBuf::from("alt.json"));
        assert_eq!(args.assets_dir, Some(PathBuf::from("/tmp/a")));
        assert!(args.debug_mode);
        assert_eq!(args.timeout_secs, Some(30));
    }

    #[test]
    fn test_bad_input_stops() {
        assert!(parse(&["--timeout=soon"]).is_none());
        assert!(parse(&["--gui"]).is_none());
    }
}

//! # Bloco Host Daemon
//!
//! Runs a simulated board and robot through a scenario script and prints
//! what happened.

use blocod::{Daemon, DaemonConfig, DaemonOptions};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args: Vec<String> = env::args().collect();

    let options = parse_args(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        print_usage(&args[0]);
        process::exit(1);
    });

    let mut daemon = Daemon::new(options).unwrap_or_else(|e| {
        eprintln!("Failed to start daemon: {}", e);
        process::exit(1);
    });

    match daemon.run() {
        Ok(summary) => print!("{}", summary),
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Result<DaemonOptions, String> {
    let mut options = DaemonOptions::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--script" | "-s" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --script".to_string());
                }
                let script_text = fs::read_to_string(&args[i])
                    .map_err(|e| format!("Failed to read script file: {}", e))?;
                options.script = Some(script_text);
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --config".to_string());
                }
                options.config = DaemonConfig::load(&args[i])
                    .map_err(|e| format!("Failed to load config: {}", e))?;
            }
            "--max-steps" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --max-steps".to_string());
                }
                options.max_steps = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid max-steps value: {}", args[i]))?;
            }
            "--state-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --state-dir".to_string());
                }
                options.state_dir = Some(PathBuf::from(&args[i]));
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other => {
                return Err(format!("Unknown option: {}", other));
            }
        }
        i += 1;
    }

    Ok(options)
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --script <FILE>      Scenario script (default: built-in demo)");
    eprintln!("  -c, --config <FILE>      JSON node configuration");
    eprintln!("  --max-steps <N>          Maximum scheduler passes (0 = unlimited)");
    eprintln!("  --state-dir <DIR>        Persist pairing in DIR instead of memory");
    eprintln!("  -h, --help               Show this help message");
    eprintln!();
    eprintln!("Logging is controlled by RUST_LOG (default: info).");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} --script scenarios/pair_and_send.bloco", program);
    eprintln!("  {} --config blocod.json --state-dir /tmp/bloco", program);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("blocod")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let options = parse_args(&args(&[])).unwrap();
        assert!(options.script.is_none());
        assert_eq!(options.max_steps, 0);
        assert!(options.state_dir.is_none());
    }

    #[test]
    fn test_parse_options() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.bloco");
        fs::write(&script, "wait 1s\n").unwrap();
        let config = dir.path().join("blocod.json");
        fs::write(&config, r#"{"board": {"idle_tick_ms": 20}}"#).unwrap();

        let options = parse_args(&args(&[
            "--script",
            script.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
            "--max-steps",
            "50",
            "--state-dir",
            "/tmp/bloco",
        ]))
        .unwrap();
        assert_eq!(options.script.as_deref(), Some("wait 1s\n"));
        assert_eq!(options.config.board.idle_tick_ms, 20);
        assert_eq!(options.max_steps, 50);
        assert_eq!(options.state_dir, Some(PathBuf::from("/tmp/bloco")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["--max-steps"])).is_err());
        assert!(parse_args(&args(&["--max-steps", "many"])).is_err());
        assert!(parse_args(&args(&["--verbose"])).is_err());
        assert!(parse_args(&args(&["--script", "/nonexistent/run.bloco"])).is_err());
    }
}

// src/cli.rs

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Annotate a Go goroutine dump with the commits that last touched each frame
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file [default: ~/.blame-trace.yaml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Repository the dumped program was built from [default: discovered from the current directory]
    #[arg(short, long, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Revision to blame at [default: HEAD]
    #[arg(long, value_name = "REV")]
    pub revision: Option<String>,

    /// Read the dump from FILE instead of stdin
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Print the annotated dump instead of opening the viewer
    #[arg(short, long)]
    pub print: bool,

    /// Use N parallel blame jobs
    #[arg(short, long, value_name = "N", default_value_t = get_parallelism())]
    pub jobs: usize,

    /// Enable verbose output
    ///
    /// This can be repeated up to 3 times to enable successively more output.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Write log output to FILE
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

fn get_parallelism() -> usize {
    match std::thread::available_parallelism() {
        Err(_e) => 1,
        Ok(v) => v.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "blame-trace",
            "--repo",
            "/src/app",
            "--revision",
            "v1.0",
            "-i",
            "dump.txt",
            "--print",
            "-j",
            "3",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.repo, Some(PathBuf::from("/src/app")));
        assert_eq!(args.revision.as_deref(), Some("v1.0"));
        assert_eq!(args.input, Some(PathBuf::from("dump.txt")));
        assert!(args.print);
        assert_eq!(args.jobs, 3);
        assert_eq!(args.verbose, 2);
        assert!(!args.quiet);
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["blame-trace"]).unwrap();
        assert_eq!(args.config, None);
        assert_eq!(args.input, None);
        assert!(!args.print);
        assert!(args.jobs >= 1);
    }
}

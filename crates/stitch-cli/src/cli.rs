use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stitch", about = "Stitch: resumable chunked uploads", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding `temp/` (staged chunks) and `uploads/` (artifacts)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Split a local file into chunks, stage the missing ones, and merge
    Upload(UploadArgs),
    /// Show which chunks of a session are staged
    Status(StatusArgs),
    /// Merge a complete session into an artifact
    Merge(MergeArgs),
    /// List merged artifacts
    Ls(LsArgs),
    /// Copy a merged artifact out of the store
    Get(GetArgs),
    /// Delete every staged chunk of a session
    Discard(DiscardArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct UploadArgs {
    pub path: PathBuf,
    /// Artifact name; defaults to the file name of `path`
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value_t = 1024 * 1024)]
    pub chunk_size: u64,
    /// Stage chunks but do not merge
    #[arg(long)]
    pub no_merge: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    pub hash: String,
}

#[derive(Args)]
pub struct MergeArgs {
    pub hash: String,
    pub filename: String,
    #[arg(short = 'n', long)]
    pub total: u32,
}

#[derive(Args)]
pub struct LsArgs {}

#[derive(Args)]
pub struct GetArgs {
    pub filename: String,
    /// Output path; `-` writes to stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DiscardArgs {
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["stitch", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind.as_deref(), Some("0.0.0.0:8080"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_upload_defaults() {
        let cli = Cli::try_parse_from(["stitch", "upload", "movie.mp4"]).unwrap();
        if let Command::Upload(args) = cli.command {
            assert_eq!(args.path, PathBuf::from("movie.mp4"));
            assert_eq!(args.chunk_size, 1024 * 1024);
            assert!(args.name.is_none());
            assert!(!args.no_merge);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_upload_with_options() {
        let cli = Cli::try_parse_from([
            "stitch", "upload", "a.bin", "--name", "b.bin", "--chunk-size", "4096", "--no-merge",
        ])
        .unwrap();
        if let Command::Upload(args) = cli.command {
            assert_eq!(args.name.as_deref(), Some("b.bin"));
            assert_eq!(args.chunk_size, 4096);
            assert!(args.no_merge);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_merge() {
        let cli = Cli::try_parse_from(["stitch", "merge", "abc123", "video.mp4", "-n", "3"]).unwrap();
        if let Command::Merge(args) = cli.command {
            assert_eq!(args.hash, "abc123");
            assert_eq!(args.filename, "video.mp4");
            assert_eq!(args.total, 3);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn merge_requires_total() {
        assert!(Cli::try_parse_from(["stitch", "merge", "abc123", "video.mp4"]).is_err());
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "stitch", "ls", "--format", "json", "--data-dir", "/srv/stitch", "-v",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Ls(_)));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/stitch")));
        assert!(cli.verbose);
    }

    #[test]
    fn parse_get_stdout() {
        let cli = Cli::try_parse_from(["stitch", "get", "video.mp4", "-o", "-"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.output, Some(PathBuf::from("-")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_status_and_discard() {
        let cli = Cli::try_parse_from(["stitch", "status", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::Status(ref a) if a.hash == "abc"));
        let cli = Cli::try_parse_from(["stitch", "discard", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::Discard(ref a) if a.hash == "abc"));
    }

    #[test]
    fn unknown_command_fails() {
        assert!(Cli::try_parse_from(["stitch", "frobnicate"]).is_err());
    }
}

//! Command-line surface.
//!
//! Flag letters are grounded on `cmdline.py`'s `getopt` short-option
//! string (`s:u:p:P:en:c:b:qh`); `clap::Parser` replaces the original's
//! hand-rolled `getopt` loop while keeping the same one-letter flags.
//! `-b`, `-p` and `-q` carry the external-interface contract's meaning
//! (bitrate cap, password prompt, skip-verification), not a bandwidth
//! throttle or a quiet-progress toggle.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "nzbstream", about = "Stream a media file out of a Usenet RAR set")]
pub struct Cli {
    /// Path or URL to the NZB index describing the release.
    pub nzb: String,

    /// NNTP server hostname.
    #[arg(short = 's', long = "server")]
    pub server: Option<String>,

    /// NNTP username.
    #[arg(short = 'u', long = "username")]
    pub username: Option<String>,

    /// Prompt for the NNTP password interactively instead of reading it
    /// from the config file.
    #[arg(short = 'p', long = "prompt-password")]
    pub prompt_password: bool,

    /// NNTP server port.
    #[arg(short = 'P', long = "port")]
    pub port: Option<u16>,

    /// Use a TLS connection to the server.
    #[arg(short = 'e', long = "ssl")]
    pub use_tls: bool,

    /// Number of concurrent fetch connections/workers.
    #[arg(short = 'n', long = "connections", default_value_t = 8)]
    pub connections: u32,

    /// Alternate config file path (defaults to ~/.nzbstream, then ~/.netrc).
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<PathBuf>,

    /// Maximum acceptable bitrate in bits/sec; exceeding it before any
    /// byte is streamed is an error.
    #[arg(short = 'b', long = "max-bitrate")]
    pub max_bitrate: Option<f64>,

    /// Skip the verification stage (media-type check and bitrate cap)
    /// and stream as soon as the set is resolved.
    #[arg(short = 'q', long = "skip-verify")]
    pub skip_verify: bool,

    /// Destination path for the extracted media file.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::parse_from(["nzbstream", "release.nzb"]);
        assert_eq!(cli.nzb, "release.nzb");
        assert_eq!(cli.connections, 8);
        assert!(!cli.use_tls);
    }

    #[test]
    fn parses_full_flag_set() {
        let cli = Cli::parse_from([
            "nzbstream",
            "-s",
            "news.example.com",
            "-u",
            "alice",
            "-p",
            "-P",
            "563",
            "-e",
            "-n",
            "16",
            "-b",
            "5000000",
            "-q",
            "release.nzb",
        ]);
        assert_eq!(cli.server.as_deref(), Some("news.example.com"));
        assert_eq!(cli.port, Some(563));
        assert!(cli.use_tls);
        assert_eq!(cli.connections, 16);
        assert_eq!(cli.max_bitrate, Some(5_000_000.0));
        assert!(cli.prompt_password);
        assert!(cli.skip_verify);
    }
}

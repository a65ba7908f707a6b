//! Command line and environment configuration

use std::path::PathBuf;

use clap::Parser;
use torrent::QbitSettings;

/// Stream a torrent over HTTP while it downloads
#[derive(Debug, Parser)]
#[command(name = "peerstream", version)]
pub struct Config {
    /// Magnet link, .torrent URL or path to a .torrent file
    pub torrent: String,

    /// Port the HTTP server listens on
    #[arg(short, long, default_value_t = 8888)]
    pub port: u16,

    /// Host to bind and advertise; all interfaces if unset
    #[arg(long)]
    pub hostname: Option<String>,

    /// Serve this file index instead of the largest file
    #[arg(short, long)]
    pub index: Option<usize>,

    /// List the files of the torrent and exit
    #[arg(short, long)]
    pub list: bool,

    /// Select every file and advertise the playlist
    #[arg(short, long)]
    pub all: bool,

    /// PeerGuardian style blocklist to load
    #[arg(short, long)]
    pub blocklist: Option<PathBuf>,

    /// Extra peer to connect to, as ip:port (repeatable)
    #[arg(short = 'e', long = "peer")]
    pub peers: Vec<String>,

    /// Delete the torrent and its data on exit
    #[arg(short, long)]
    pub remove: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Shell command run once the selected files are downloaded
    #[arg(long)]
    pub on_downloaded: Option<String>,

    /// Shell command run with the stream URL once the server is up
    #[arg(long)]
    pub on_listening: Option<String>,

    /// qBittorrent Web UI endpoint
    #[arg(long, env = "QBIT_HOST", default_value = "http://localhost:8080")]
    pub qbit_host: String,

    #[arg(long, env = "QBIT_USERNAME", default_value = "admin")]
    pub qbit_username: String,

    #[arg(long, env = "QBIT_PASSWORD", default_value = "", hide_env_values = true)]
    pub qbit_password: String,

    /// Download directory for the torrent
    #[arg(long, env = "QBIT_SAVE_PATH")]
    pub save_path: Option<String>,
}

impl Config {
    pub fn qbit_settings(&self) -> QbitSettings {
        let mut settings = QbitSettings::new(
            self.qbit_host.as_str(),
            self.qbit_username.as_str(),
            self.qbit_password.as_str(),
        );
        settings.save_path = self.save_path.clone();
        settings
    }

    /// Default log level when `RUST_LOG` is not set
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Interface the server binds
    pub fn bind_host(&self) -> &str {
        self.hostname.as_deref().unwrap_or("0.0.0.0")
    }

    /// URL advertised for a server listening on `port`
    pub fn stream_url(&self, port: u16) -> String {
        let host = self.hostname.as_deref().unwrap_or("localhost");
        let url = format!("http://{}:{}/", host, port);
        if self.all {
            format!("{}.m3u", url)
        } else {
            url
        }
    }
}

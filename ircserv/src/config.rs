//! Server configuration and command-line arguments.

use std::time::Duration;

use clap::Parser;

/// Name the server uses as the prefix of its own replies.
pub const SERVER_NAME: &str = "ircserv";

/// Version string advertised in RPL_YOURHOST and RPL_MYINFO.
pub const VERSION: &str = concat!("ircserv-", env!("CARGO_PKG_VERSION"));

/// `ircserv <port> <password>`
#[derive(Parser, Debug, Clone)]
#[command(name = "ircserv", version, about = "A small IRC server")]
pub struct Cli {
    /// TCP port to listen on.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Connection password every client must send with PASS.
    #[arg(value_parser = parse_password)]
    pub password: String,
}

fn parse_password(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("password must not be empty".to_string());
    }
    Ok(raw.to_string())
}

impl Cli {
    /// Listen on every interface at the given port.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_addr: format!("0.0.0.0:{}", self.port),
            password: self.password,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:6667`. Tests use `127.0.0.1:0`.
    pub listen_addr: String,
    pub password: String,
    pub server_name: String,
    /// Capacity of each client's outbound line queue. Lines beyond it are dropped.
    pub outbound_queue: usize,
    /// Upper bound on how long the accept loop sleeps between housekeeping passes.
    pub idle_tick: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6667".to_string(),
            password: String::new(),
            server_name: SERVER_NAME.to_string(),
            outbound_queue: 4096,
            idle_tick: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_and_password() {
        let cli = Cli::try_parse_from(["ircserv", "6667", "hunter2"]).unwrap();
        let config = cli.into_config();
        assert_eq!(config.listen_addr, "0.0.0.0:6667");
        assert_eq!(config.password, "hunter2");
        assert_eq!(config.server_name, SERVER_NAME);
    }

    #[test]
    fn rejects_bad_arguments() {
        for args in [
            vec!["ircserv"],
            vec!["ircserv", "6667"],
            vec!["ircserv", "0", "pw"],
            vec!["ircserv", "65536", "pw"],
            vec!["ircserv", "port", "pw"],
            vec!["ircserv", "6667", ""],
            vec!["ircserv", "6667", "pw", "extra"],
        ] {
            assert!(Cli::try_parse_from(args.clone()).is_err(), "{args:?} should fail");
        }
    }

    #[test]
    fn version_names_the_server() {
        assert!(VERSION.starts_with("ircserv-"));
    }
}

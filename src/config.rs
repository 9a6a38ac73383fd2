use clap::Parser;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

const HOST: &str = "127.0.0.1";
const PORT: u16 = 6380;

const LONG_ABOUT: &str = "A Redis protocol bridge that serves messages from per-key upstream \
streams.

The standalone binary serves an in-memory hub that nothing publishes into, so every GET waits \
until shutdown. Embed the library and pass your own MessageSource to serve real streams.";

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about, long_about = LONG_ABOUT)]
pub struct Config {
    /// The host to listen on
    #[arg(long, env = "STREAMDIS_HOST", default_value = HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "STREAMDIS_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Largest request a client may send, in bytes. Clients exceeding it are disconnected
    #[arg(long, env = "STREAMDIS_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Config {
    /// The `host:port` pair the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["streamdis"]).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:6380");
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "streamdis",
            "--host",
            "0.0.0.0",
            "-p",
            "7000",
            "--max-frame-size",
            "1024",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:7000");
        assert_eq!(config.max_frame_size, 1024);
    }

    #[test]
    fn long_help_explains_the_standalone_hub() {
        let help = Config::command().render_long_help().to_string();

        assert!(help.contains("nothing publishes into"));
    }

    #[test]
    fn invalid_port() {
        assert!(Config::try_parse_from(["streamdis", "--port", "not-a-port"]).is_err());
    }
}

use anyhow::{Context, bail};
use clap::Parser;
use core::num::NonZeroUsize;
use core::time::Duration;
use sortition::{Alphabet, DEFAULT_ALPHABET, DEFAULT_POOL_SIZE};
use std::path::PathBuf;

/// Name of the database file inside the data directory.
pub const DB_FILE_NAME: &str = "db";

/// Runtime configuration for the `sortition-server` binary.
///
/// Every value is parsed from CLI arguments or environment variables (a `.env`
/// file in the working directory is honored) and validated once at startup.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sortition-server",
    version,
    about = "An HTTP service that rotates redirects across the items of a hub"
)]
pub struct CliArgs {
    /// Directory holding the database file. Created if missing.
    ///
    /// Environment variable: `SORTITION_DIR`
    #[arg(long, env = "SORTITION_DIR", default_value = ".sortition")]
    pub dir: PathBuf,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Number of characters in every hub and item identifier.
    ///
    /// Changing this for an existing database makes previously issued
    /// identifiers unreachable, since request paths are validated against the
    /// current length.
    ///
    /// Environment variable: `ID_LENGTH`
    #[arg(long, env = "ID_LENGTH", default_value_t = 10)]
    pub id_length: usize,

    /// Characters identifiers are drawn from. Must be URL-safe.
    ///
    /// Environment variable: `ID_ALPHABET`
    #[arg(long, env = "ID_ALPHABET", default_value_t = String::from(DEFAULT_ALPHABET))]
    pub id_alphabet: String,

    /// Number of random words buffered between refills of the entropy pool.
    ///
    /// Environment variable: `ENTROPY_POOL_SIZE`
    #[arg(long, env = "ENTROPY_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub entropy_pool_size: usize,

    /// How long a statement waits on a locked database before failing.
    ///
    /// Environment variable: `BUSY_TIMEOUT_SECS`
    #[arg(long, env = "BUSY_TIMEOUT_SECS", default_value_t = 5)]
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub server_addr: String,
    pub id_length: NonZeroUsize,
    pub alphabet: Alphabet,
    pub entropy_pool_size: usize,
    pub busy_timeout: Duration,
}

impl ServerConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let Some(id_length) = NonZeroUsize::new(args.id_length) else {
            bail!("ID_LENGTH must be greater than 0");
        };

        if args.entropy_pool_size == 0 {
            bail!("ENTROPY_POOL_SIZE must be greater than 0");
        }

        if args.dir.as_os_str().is_empty() {
            bail!("SORTITION_DIR must not be empty");
        }

        let alphabet = args
            .id_alphabet
            .parse::<Alphabet>()
            .with_context(|| format!("invalid ID_ALPHABET `{}`", args.id_alphabet))?;

        Ok(Self {
            data_dir: args.dir,
            server_addr: args.server_addr,
            id_length,
            alphabet,
            entropy_pool_size: args.entropy_pool_size,
            busy_timeout: Duration::from_secs(args.busy_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let argv = ["sortition-server"].iter().chain(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::try_from(args(&[])).unwrap();
        assert_eq!(config.id_length.get(), 10);
        assert_eq!(config.alphabet.as_str(), DEFAULT_ALPHABET);
        assert_eq!(config.entropy_pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert!(config.db_path().ends_with(DB_FILE_NAME));
    }

    #[test]
    fn rejects_zero_length() {
        let err = ServerConfig::try_from(args(&["--id-length", "0"])).unwrap_err();
        assert!(err.to_string().contains("ID_LENGTH"));
    }

    #[test]
    fn rejects_unsafe_alphabet() {
        let err = ServerConfig::try_from(args(&["--id-alphabet", "ab/"])).unwrap_err();
        assert!(err.to_string().contains("ID_ALPHABET"));
    }

    #[test]
    fn rejects_empty_pool() {
        assert!(ServerConfig::try_from(args(&["--entropy-pool-size", "0"])).is_err());
    }

    #[test]
    fn custom_alphabet() {
        let config = ServerConfig::try_from(args(&["--id-alphabet", "abc", "--id-length", "4"])).unwrap();
        assert_eq!(config.alphabet.as_str(), "abc");
        assert_eq!(config.id_length.get(), 4);
    }
}

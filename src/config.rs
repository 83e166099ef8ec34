//! Process configuration read from the environment.
//!
//! `APP_ENV` picks which env file is loaded: `.env.dev`, `.env.test`, or none
//! at all in `prod`, where the real environment is authoritative. Other
//! variables: `DATABASE_URL`, `JWT_SECRET`, `JWT_EXP_HOURS`, `APP_PORT`,
//! `RUST_LOG`.

use std::path::Path;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Test,
    Prod,
}

impl Environment {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("APP_ENV").unwrap_or_default())
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Prod,
            "test" => Environment::Test,
            _ => Environment::Dev,
        }
    }

    pub fn env_file(&self) -> Option<&'static str> {
        match self {
            Environment::Dev => Some(".env.dev"),
            Environment::Test => Some(".env.test"),
            Environment::Prod => None,
        }
    }

    /// Filter used when `RUST_LOG` is unset. Dev also shows SQL statements.
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Environment::Dev => "debug,sqlx=debug,hyper=info",
            Environment::Test => "warn",
            Environment::Prod => "info,sqlx=warn",
        }
    }
}

/// Loads the env file for `environment`, then `.env`, from the working
/// directory or the crate directory. Values already set are kept.
pub fn load_env(environment: Environment) {
    let Some(file) = environment.env_file() else {
        return;
    };

    let crate_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        Path::new(file).to_path_buf(),
        crate_dir.join(file),
        Path::new(".env").to_path_buf(),
        crate_dir.join(".env"),
    ];

    for candidate in candidates {
        if dotenvy::from_path(&candidate).is_ok() {
            return;
        }
    }
}

pub fn app_port() -> u16 {
    parse_port(std::env::var("APP_PORT").ok().as_deref())
}

fn parse_port(value: Option<&str>) -> u16 {
    value
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT)
}

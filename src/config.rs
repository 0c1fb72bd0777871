// src/config.rs
use std::env;

const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub public_token_pepper: String,
    pub token_seal_key: String,
    pub google_client_id: String,
    pub google_tokeninfo_url: String,
    pub session_ttl_minutes: i64,
}

impl Config {
    pub fn load() -> Self {
        let port = env::var("PORT").unwrap_or_else(|_| "3030".to_string());
        let port = port.parse::<u16>().expect("PORT must be a valid number");

        let session_ttl_minutes = env::var("SESSION_TTL_MINUTES")
            .unwrap_or_else(|_| (60 * 24 * 7).to_string())
            .parse::<i64>()
            .expect("SESSION_TTL_MINUTES must be a valid number");

        Self {
            port,
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            public_token_pepper: env::var("PUBLIC_TOKEN_PEPPER")
                .expect("PUBLIC_TOKEN_PEPPER must be set"),
            token_seal_key: env::var("TOKEN_SEAL_KEY").expect("TOKEN_SEAL_KEY must be set"),
            google_client_id: env::var("GOOGLE_CLIENT_ID").expect("GOOGLE_CLIENT_ID must be set"),
            google_tokeninfo_url: env::var("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|_| DEFAULT_TOKENINFO_URL.to_string()),
            session_ttl_minutes,
        }
    }
}

use std::path::PathBuf;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("SCRIPTOR_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let data_dir = std::env::var("SCRIPTOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        // Generation calls fail with a clear message when the key is absent;
        // startup itself does not require it.
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        let api_url = std::env::var("OPENAI_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        // Base used when building share links handed back to clients.
        let public_url = std::env::var("SCRIPTOR_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Config {
            bind_addr,
            data_dir,
            api_key,
            api_url,
            model,
            public_url,
        }
    }
}

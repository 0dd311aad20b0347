use std::sync::Arc;

use clap::Parser;
use log::info;

use frijolitos::app::{self, AppState};
use frijolitos::auth::SupabaseAuth;
use frijolitos::store::SupabaseStore;

/// Sales dashboard backend for Frijolitos Costeños.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Config {
    /// Address to listen on.
    #[arg(long, env = "FRIJOLITOS_BIND", default_value = "127.0.0.1:3000")]
    bind: String,

    /// Base URL of the Supabase project.
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: String,

    /// Anonymous API key of the Supabase project.
    #[arg(long, env = "SUPABASE_ANON_KEY")]
    supabase_key: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = Config::parse();

    info!("connecting to store at {}", config.supabase_url);
    let state = AppState {
        store: Arc::new(SupabaseStore::new(&config.supabase_url, &config.supabase_key)),
        auth: Arc::new(SupabaseAuth::new(&config.supabase_url, &config.supabase_key)),
    };

    app::run(state, &config.bind).await?;
    Ok(())
}

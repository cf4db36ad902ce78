use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use outdial::config::AppConfig;
use outdial::db;
use outdial::handlers;
use outdial::services::ai::groq::GroqProvider;
use outdial::services::ai::ollama::OllamaProvider;
use outdial::services::ai::turn::LlmTurnAdapter;
use outdial::services::ai::LlmProvider;
use outdial::services::ledger::MeetingLedger;
use outdial::services::registry::SessionRegistry;
use outdial::services::telephony::twilio::TwilioVoiceProvider;
use outdial::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let db = Arc::new(Mutex::new(conn));

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(
                !config.groq_api_key.is_empty(),
                "GROQ_API_KEY must be set when LLM_PROVIDER=groq"
            );
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
            ))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                "llama3.2".to_string(),
            ))
        }
    };

    let telephony = TwilioVoiceProvider::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_phone_number.clone(),
    );

    let state = Arc::new(AppState {
        db: Arc::clone(&db),
        ledger: MeetingLedger::new(db),
        sessions: SessionRegistry::new(config.session_ttl_minutes),
        turns: Box::new(LlmTurnAdapter::new(llm)),
        telephony: Box::new(telephony),
        config: config.clone(),
    });

    // Idle sessions are swept in the background; sessions mid-turn are
    // skipped by the sweep and picked up next round.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let evicted = state.sessions.evict_idle(chrono::Utc::now());
                if evicted > 0 {
                    tracing::info!(evicted, "evicted idle call sessions");
                }
            }
        });
    }

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/voice", post(handlers::webhook::voice_start))
        .route("/webhook/voice/turn", post(handlers::webhook::voice_turn))
        .route(
            "/webhook/voice/status",
            post(handlers::webhook::voice_status),
        )
        .route("/api/admin/status", get(handlers::admin::get_status))
        .route("/api/admin/meetings", get(handlers::admin::get_meetings))
        .route(
            "/api/admin/meetings/:id/cancel",
            post(handlers::admin::cancel_meeting),
        )
        .route(
            "/api/admin/meetings/clear",
            post(handlers::admin::clear_meetings),
        )
        .route("/api/admin/windows", get(handlers::admin::get_windows))
        .route("/api/admin/windows", post(handlers::admin::update_windows))
        .route("/api/admin/company", get(handlers::admin::get_company))
        .route("/api/admin/company", post(handlers::admin::update_company))
        .route("/api/admin/calls", post(handlers::admin::start_call))
        .route("/calendar/feed.ics", get(handlers::calendar::calendar_feed))
        .route("/calendar/:meeting_id", get(handlers::calendar::download_ics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use tracing_subscriber::EnvFilter;

/// Default filter per environment; `RUST_LOG` wins when set.
fn default_filter(env: &str) -> &'static str {
    match env {
        "local" | "dev" => "user_service=debug,tower_http=debug,axum=info",
        _ => "user_service=info,tower_http=info,axum=info",
    }
}

fn json_output(env: &str) -> bool {
    env != "local"
}

pub fn init(env: &str) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(env).to_string());
    let env_filter = EnvFilter::try_new(&env_filter)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(env)));

    if json_output(env) {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}
